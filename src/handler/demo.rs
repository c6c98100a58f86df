//! Demo endpoints kept for smoke tests: `/`, `/hi/{name}`, `/env`

use percent_encoding::percent_decode_str;
use serde_json::{json, Value};

const ROOT_MESSAGE: &str =
    "This is an example of a Supabase gateway - go to /hi/<name> to see a greeting rendered";

pub fn root() -> Value {
    json!({ "message": ROOT_MESSAGE })
}

pub fn health() -> Value {
    json!({ "status": "ok" })
}

pub fn hello(name: &str) -> Value {
    json!({ "message": format!("Hello, {name}!") })
}

pub fn env(message: &str) -> Value {
    json!({
        "message": format!("Here is an example of getting an environment variable: {message}")
    })
}

/// Decode `%XX` escapes; malformed escapes are kept literally
pub fn percent_decode(input: &str) -> String {
    percent_decode_str(input).decode_utf8_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(hello("Ada")["message"], "Hello, Ada!");
        assert_eq!(health(), json!({"status": "ok"}));
        assert_eq!(
            env("prod")["message"],
            "Here is an example of getting an environment variable: prod"
        );
        assert!(root()["message"].as_str().unwrap().contains("/hi/<name>"));
    }

    #[test]
    fn test_percent_decode() {
        assert_eq!(percent_decode("Jos%C3%A9"), "José");
        assert_eq!(percent_decode("a%20b"), "a b");
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("%zz"), "%zz");
        assert_eq!(percent_decode("%4"), "%4");
    }
}
