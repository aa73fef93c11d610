fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use stashbox_protocol::{
        CompleteMultipartRequest, InitMultipartRequest, InitMultipartResponse, QueueEntry,
        RemoteFileRecord, UploadState,
    };

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        let path = fixtures_dir().join(name);
        let data = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        serde_json::from_str(&data)
            .unwrap_or_else(|e| panic!("failed to parse fixture {}: {e}", path.display()))
    }

    /// Normalizes JSON numbers so that `40` and `40.0` compare equal.
    ///
    /// The web API writes whole-number percentages as integers while
    /// `f64` fields serialize with a fractional part.
    fn normalize_value(v: &serde_json::Value) -> serde_json::Value {
        match v {
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) => serde_json::json!(f),
                None => v.clone(),
            },
            serde_json::Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), normalize_value(v)))
                    .collect(),
            ),
            serde_json::Value::Array(arr) => {
                serde_json::Value::Array(arr.iter().map(normalize_value).collect())
            }
            _ => v.clone(),
        }
    }

    /// Deserializes a fixture into a Rust type, re-serializes it, and compares
    /// the JSON values (order-independent comparison).
    fn roundtrip_test<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));

        assert_eq!(
            normalize_value(&fixture),
            normalize_value(&reserialized),
            "roundtrip mismatch for {name}:\n  API:  {fixture}\n  Rust: {reserialized}"
        );
        parsed
    }

    #[test]
    fn fixture_file_record() {
        let record: RemoteFileRecord = roundtrip_test("file_record.json");
        assert_eq!(record.size, 25 * 1024 * 1024);
        assert_eq!(record.folder, "videos/2024");
        assert!(!record.is_folder_marker());
        assert!(record.created_at_utc().is_some());
    }

    #[test]
    fn fixture_file_list() {
        let records: Vec<RemoteFileRecord> =
            serde_json::from_value(load_fixture("file_list.json")).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].folder, "", "missing folder means root");
        assert!(!records[0].is_folder_marker());
        assert!(records[1].is_folder_marker());
    }

    #[test]
    fn fixture_init_multipart_request() {
        let req: InitMultipartRequest = roundtrip_test("init_multipart_request.json");
        assert_eq!(req.content_type, "video/mp4");
    }

    #[test]
    fn fixture_init_multipart_response() {
        let resp: InitMultipartResponse = roundtrip_test("init_multipart_response.json");
        assert!(resp.key.ends_with("holiday.mp4"));
    }

    #[test]
    fn fixture_complete_multipart_request() {
        let req: CompleteMultipartRequest = roundtrip_test("complete_multipart_request.json");
        assert_eq!(req.parts.len(), 3);
        assert!(req.parts_are_contiguous());
        assert!(req.parts[0].etag.starts_with('"'), "etags are passed through verbatim");
    }

    #[test]
    fn fixture_queue_entry() {
        let entry: QueueEntry = roundtrip_test("queue_entry.json");
        assert_eq!(entry.state, UploadState::Failed);
        assert_eq!(entry.progress_percent, 40.0);
    }

    #[test]
    fn fixture_queue_entry_without_error() {
        let mut value = load_fixture("queue_entry.json");
        value.as_object_mut().unwrap().remove("lastError");
        value["state"] = serde_json::json!("uploading");

        let entry: QueueEntry = serde_json::from_value(value).unwrap();
        assert_eq!(entry.last_error, None);
        let out = serde_json::to_value(&entry).unwrap();
        assert!(out.get("lastError").is_none());
    }
}
