//! SMS sender against a local gateway.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use eth_facade::sms::{AuditLog, HttpSmsProvider, SmsCredentials, SmsError, SmsSender};

mod common;

fn credentials() -> SmsCredentials {
    SmsCredentials {
        access_key_id: "LTAI-test".into(),
        access_key_secret: "secret".into(),
        sign_name: "Acme".into(),
    }
}

fn params() -> BTreeMap<String, String> {
    BTreeMap::from([("code".to_string(), "9087".to_string())])
}

#[tokio::test]
async fn test_gateway_success_writes_one_record() {
    let bodies = Arc::new(Mutex::new(Vec::new()));
    let seen = bodies.clone();
    let addr = common::start_programmable_backend(move |body| {
        seen.lock().unwrap().push(body);
        async move {
            (
                200,
                r#"{"RequestId":"REQ-1","BizId":"BIZ-1","Code":"OK","Message":"OK"}"#.to_string(),
            )
        }
    })
    .await;

    let dir = tempfile::tempdir().unwrap();
    let provider = HttpSmsProvider::new(format!("http://{}/", addr), Duration::from_secs(5)).unwrap();
    let sender = SmsSender::new(
        Arc::new(provider),
        credentials(),
        AuditLog::new(dir.path().join("sms.jsonl")),
    );

    let outcome = sender.send("13800000000", "SMS_200", &params()).await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.request_id, "REQ-1");

    let body = bodies.lock().unwrap()[0].clone();
    assert!(body.contains("Action=SendSms"));
    assert!(body.contains("PhoneNumbers=13800000000"));
    assert!(body.contains("SignName=Acme"));
    assert!(body.contains("TemplateCode=SMS_200"));
    assert!(!body.contains("secret"));

    let records = sender.audit_log().read_all().await.unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].success);
    assert_eq!(records[0].biz_id, "BIZ-1");
    assert_eq!(records[0].template_param, r#"{"code":"9087"}"#);
}

#[tokio::test]
async fn test_gateway_refusal_writes_one_record() {
    let addr = common::start_programmable_backend(|_| async {
        (
            400,
            r#"{"RequestId":"REQ-2","Code":"isv.AMOUNT_NOT_ENOUGH","Message":"balance too low"}"#
                .to_string(),
        )
    })
    .await;

    let dir = tempfile::tempdir().unwrap();
    let provider = HttpSmsProvider::new(format!("http://{}/", addr), Duration::from_secs(5)).unwrap();
    let sender = SmsSender::new(
        Arc::new(provider),
        credentials(),
        AuditLog::new(dir.path().join("sms.jsonl")),
    );

    let result = sender.send("13800000000", "SMS_200", &params()).await;
    assert!(matches!(result, Err(SmsError::Provider { .. })));

    let records = sender.audit_log().read_all().await.unwrap();
    assert_eq!(records.len(), 1);
    assert!(!records[0].success);
    assert_eq!(records[0].code, "isv.AMOUNT_NOT_ENOUGH");
    assert_eq!(records[0].request_id, "REQ-2");
}

#[tokio::test]
async fn test_garbage_response_is_transport_error_and_audited() {
    let addr = common::start_programmable_backend(|_| async {
        (503, "upstream unavailable".to_string())
    })
    .await;

    let dir = tempfile::tempdir().unwrap();
    let provider = HttpSmsProvider::new(format!("http://{}/", addr), Duration::from_secs(5)).unwrap();
    let sender = SmsSender::new(
        Arc::new(provider),
        credentials(),
        AuditLog::new(dir.path().join("sms.jsonl")),
    );

    let result = sender.send("13800000000", "SMS_200", &params()).await;
    assert!(matches!(result, Err(SmsError::Transport(_))));
    assert_eq!(sender.audit_log().read_all().await.unwrap().len(), 1);
}
