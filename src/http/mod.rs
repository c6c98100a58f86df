//! HTTP protocol layer module
//!
//! Response builders, conditional GET and MIME detection shared by the
//! proxy and static-file handlers.

pub mod cache;
pub mod mime;
pub mod response;

pub use response::{
    build_304_response, build_400_response, build_404_response, build_405_response,
    build_413_response, build_cached_response, build_error_response, build_json_response,
    build_options_response,
};
