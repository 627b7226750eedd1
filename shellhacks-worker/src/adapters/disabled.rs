/// Stand-in for the spreadsheet and drive integrations when no mirror
/// endpoint is configured
///
/// Every call fails with `DeliveryError::Disabled`, which the dispatcher
/// treats as permanent, so queued rows end up `failed` instead of retrying.
use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};
use shellhacks_shared::integrations::{DeliveryError, FileStorage, ResumeFile, SheetMirror};

#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledMirror;

#[async_trait]
impl SheetMirror for DisabledMirror {
    async fn append_row(
        &self,
        sheet: &str,
        _fields: &Map<String, JsonValue>,
    ) -> Result<(), DeliveryError> {
        Err(DeliveryError::Disabled(format!("no mirror for sheet {}", sheet)))
    }
}

#[async_trait]
impl FileStorage for DisabledMirror {
    async fn upload_file(
        &self,
        _file: &ResumeFile,
        name: &str,
        _destination: &str,
    ) -> Result<String, DeliveryError> {
        Err(DeliveryError::Disabled(format!("no file storage for {}", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn test_everything_is_disabled() {
        let mirror = DisabledMirror;
        let err = mirror.append_row("Applicants", &Map::new()).await.unwrap_err();
        assert!(!err.is_retryable());

        let file = ResumeFile {
            file_name: "resume.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            bytes: Bytes::from_static(b"%PDF"),
        };
        assert!(matches!(
            mirror.upload_file(&file, "ada", "resumes").await,
            Err(DeliveryError::Disabled(_))
        ));
    }
}
