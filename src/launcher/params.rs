/// Parameter preparation for new instances
///
/// Two explicit passes run over the caller's parameters before they are written
/// to `params.json`: the output directory is pinned inside the instance
/// directory, and integer-looking strings become integers.

use serde_json::{Map, Number, Value};
use std::path::{Path, PathBuf};

/// Parameter naming the pipeline's output directory
pub const OUT_DIR_PARAM: &str = "out_dir";

/// Output directory name inside every instance directory
pub const OUTPUT_DIR: &str = "output";

/// Output directory of the instance rooted at `instance_dir`
pub fn output_dir(instance_dir: &Path) -> PathBuf {
    instance_dir.join(OUTPUT_DIR)
}

/// Apply both passes and return the prepared parameters
pub fn prepare(mut params: Map<String, Value>, instance_dir: &Path) -> Map<String, Value> {
    rewrite_out_dir(&mut params, instance_dir);
    coerce_integers(&mut params);
    params
}

/// Point a set `out_dir` at `<instance_dir>/output`
///
/// Absent, null, empty-string and `false` values are treated as unset and left alone.
pub fn rewrite_out_dir(params: &mut Map<String, Value>, instance_dir: &Path) {
    let is_set = match params.get(OUT_DIR_PARAM) {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::String(text)) => !text.is_empty(),
        Some(_) => true,
    };

    if is_set {
        let rewritten = output_dir(instance_dir).to_string_lossy().into_owned();
        params.insert(OUT_DIR_PARAM.to_string(), Value::String(rewritten));
    }
}

/// Replace string values that parse as a 64-bit integer with that integer
///
/// Surrounding whitespace is ignored. Anything else, including non-string
/// values and decimals, is left unchanged.
pub fn coerce_integers(params: &mut Map<String, Value>) {
    for value in params.values_mut() {
        let Value::String(text) = value else {
            continue;
        };
        if let Ok(integer) = text.trim().parse::<i64>() {
            *value = Value::Number(Number::from(integer));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn integer_strings_become_integers() {
        let mut params = as_map(json!({
            "threshold": "5",
            "negative": "-12",
            "padded": " 7 ",
            "decimal": "0.5",
            "name": "sample",
            "already": 3,
            "flag": true,
            "huge": "99999999999999999999999"
        }));
        coerce_integers(&mut params);

        assert_eq!(params["threshold"], json!(5));
        assert_eq!(params["negative"], json!(-12));
        assert_eq!(params["padded"], json!(7));
        assert_eq!(params["decimal"], json!("0.5"));
        assert_eq!(params["name"], json!("sample"));
        assert_eq!(params["already"], json!(3));
        assert_eq!(params["flag"], json!(true));
        assert_eq!(params["huge"], json!("99999999999999999999999"));
    }

    #[test]
    fn out_dir_is_pinned_inside_instance() {
        let instance_dir = Path::new("/data/instances/demo-abc");
        let params = prepare(as_map(json!({ "out_dir": "x", "threshold": "5" })), instance_dir);

        assert_eq!(params["out_dir"], json!("/data/instances/demo-abc/output"));
        assert_eq!(params["threshold"], json!(5));
    }

    #[test]
    fn unset_out_dir_is_left_alone() {
        let instance_dir = Path::new("/data/instances/demo-abc");

        let params = prepare(as_map(json!({ "threshold": "5" })), instance_dir);
        assert!(!params.contains_key("out_dir"));

        let params = prepare(as_map(json!({ "out_dir": "" })), instance_dir);
        assert_eq!(params["out_dir"], json!(""));
    }
}
