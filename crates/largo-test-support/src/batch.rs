//! Batch response bodies for mock remotes.

use serde_json::{Value, json};

/// Object entry offering `upload` at `href`, plus `verify` when given.
#[must_use]
pub fn upload_object(oid: &str, size: u64, href: &str, verify: Option<&str>) -> Value {
    let mut actions = json!({
        "upload": {"href": href, "header": {"Authorization": "Bearer upload"}, "expires_in": 3600}
    });
    if let Some(verify) = verify {
        actions["verify"] = json!({"href": verify, "header": {"Foo": "bar"}});
    }
    json!({"oid": oid, "size": size, "authenticated": true, "actions": actions})
}

/// Object entry offering `download` at `href`.
#[must_use]
pub fn download_object(oid: &str, size: u64, href: &str) -> Value {
    json!({"oid": oid, "size": size, "actions": {
        "download": {"href": href, "expires_in": 3600}
    }})
}

/// Object entry the remote already holds: no actions.
#[must_use]
pub fn present_object(oid: &str, size: u64) -> Value {
    json!({"oid": oid, "size": size})
}

/// Object entry carrying a per-object error.
#[must_use]
pub fn object_error(oid: &str, size: u64, code: i64, message: &str) -> Value {
    json!({"oid": oid, "size": size, "error": {"code": code, "message": message}})
}

/// Full batch response selecting the `basic` adapter.
#[must_use]
pub fn batch_response(objects: Vec<Value>) -> Value {
    json!({"transfer": "basic", "objects": objects})
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_action_is_optional() {
        let plain = upload_object("abc", 1, "https://s.test/abc", None);
        assert!(plain["actions"].get("verify").is_none());
        let verified = upload_object("abc", 1, "https://s.test/abc", Some("https://s.test/verify"));
        assert_eq!(verified["actions"]["verify"]["header"]["Foo"], "bar");
    }
}
