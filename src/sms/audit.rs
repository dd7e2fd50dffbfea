//! Append-only audit trail of SMS attempts.
//!
//! One JSON object per line. Records are only ever appended; nothing in the
//! crate rewrites or truncates the file.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::sms::types::{SmsError, SmsOutcome, SmsRequest};

/// One send attempt as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
    pub phone: String,
    pub sign_name: String,
    pub template_code: String,
    pub template_param: String,
    pub request_id: String,
    pub biz_id: String,
    pub code: String,
    pub message: String,
    pub success: bool,
}

impl AuditRecord {
    pub fn new(request: &SmsRequest, sign_name: &str, outcome: &SmsOutcome) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        Self {
            id: Uuid::new_v4(),
            timestamp,
            phone: request.phone_numbers.clone(),
            sign_name: sign_name.to_string(),
            template_code: request.template_code.clone(),
            template_param: request.template_param.clone(),
            request_id: outcome.request_id.clone(),
            biz_id: outcome.biz_id.clone(),
            code: outcome.code.clone(),
            message: outcome.message.clone(),
            success: outcome.success,
        }
    }
}

/// JSON-lines audit file.
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record; concurrent appends never interleave.
    pub async fn append(&self, record: &AuditRecord) -> Result<(), SmsError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    /// Read every record back, in append order.
    pub async fn read_all(&self) -> Result<Vec<AuditRecord>, SmsError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(SmsError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(code: &str) -> AuditRecord {
        let request = SmsRequest {
            phone_numbers: "13800000000".into(),
            template_code: "SMS_1".into(),
            template_param: r#"{"code":"1234"}"#.into(),
        };
        let outcome = SmsOutcome::from_response("req".into(), "biz".into(), code.into(), "m".into());
        AuditRecord::new(&request, "Shop", &outcome)
    }

    #[tokio::test]
    async fn test_append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("audit.jsonl"));

        let first = record("OK");
        let second = record("isv.DENIED");
        log.append(&first).await.unwrap();
        log.append(&second).await.unwrap();

        let records = log.read_all().await.unwrap();
        assert_eq!(records, vec![first, second]);
        assert!(records[0].success);
        assert!(!records[1].success);
    }

    #[tokio::test]
    async fn test_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("none.jsonl"));
        assert!(log.read_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unwritable_path_is_audit_error() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("missing-dir").join("audit.jsonl"));
        assert!(matches!(
            log.append(&record("OK")).await,
            Err(SmsError::Audit(_))
        ));
    }
}
