//! Request body of the multi-object delete (`POST /{bucket}/?delete`).

use serde::Deserialize;

/// `<Delete>` document listing the keys to remove.
#[derive(Deserialize, Debug, Default)]
#[serde(rename = "Delete")]
pub struct DeleteRequest {
    #[serde(rename = "Object", default)]
    pub objects: Vec<ObjectIdentifier>,

    /// When set, successful deletions are not echoed back.
    #[serde(rename = "Quiet", default)]
    pub quiet: bool,
}

#[derive(Deserialize, Debug)]
pub struct ObjectIdentifier {
    #[serde(rename = "Key")]
    pub key: String,
}

impl DeleteRequest {
    pub fn from_xml(body: &str) -> Result<Self, quick_xml::DeError> {
        quick_xml::de::from_str(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_keys_and_quiet_flag() {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<Delete xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Object><Key>a.txt</Key></Object>
  <Object><Key>dir/b.txt</Key><VersionId>ignored</VersionId></Object>
  <Quiet>true</Quiet>
</Delete>"#;
        let req = DeleteRequest::from_xml(body).unwrap();
        let keys: Vec<_> = req.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, ["a.txt", "dir/b.txt"]);
        assert!(req.quiet);
    }

    #[test]
    fn quiet_defaults_to_false() {
        let req = DeleteRequest::from_xml("<Delete><Object><Key>k</Key></Object></Delete>").unwrap();
        assert_eq!(req.objects.len(), 1);
        assert!(!req.quiet);
    }

    #[test]
    fn rejects_truncated_document() {
        assert!(DeleteRequest::from_xml("<Delete><Object><Key>unterminated").is_err());
    }
}
