use std::collections::HashMap;

use bytes::Bytes;
use hyper::Request;
use serde::de::DeserializeOwned;

use crate::handlers::http::utils::headers::is_form_request;

/// Decode a urlencoded body into owned key/value pairs. Later keys win.
pub fn read_form(body: &[u8]) -> HashMap<String, String> {
    form_urlencoded::parse(body).into_owned().collect()
}

/// Checkbox-style truthiness for form fields.
pub fn form_flag(params: &HashMap<String, String>, key: &str) -> bool {
    params
        .get(key)
        .map(|v| matches!(v.as_str(), "on" | "true" | "1" | "yes"))
        .unwrap_or(false)
}

/// Body as JSON, or `None` when the request is a form post or the JSON is
/// unusable. Callers fall back to [`read_form`] for forms.
pub fn read_json<T: DeserializeOwned>(req: &Request<Bytes>) -> Option<T> {
    if is_form_request(req.headers()) {
        return None;
    }
    serde_json::from_slice(req.body()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_decoding() {
        let params = read_form(b"email=a%40example.com&password=p%26ss&remember_me=on");
        assert_eq!(params["email"], "a@example.com");
        assert_eq!(params["password"], "p&ss");
        assert!(form_flag(&params, "remember_me"));
        assert!(!form_flag(&params, "missing"));
    }

    #[test]
    fn json_is_skipped_for_forms() {
        let req = Request::builder()
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Bytes::from_static(b"{\"email\":\"x\"}"))
            .unwrap();
        assert!(read_json::<serde_json::Value>(&req).is_none());
    }
}
