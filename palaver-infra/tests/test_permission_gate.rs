use palaver_infra::infra::permission_gate::{
    ApprovalDecision, ApproveAll, Approver, DenyAll, PermissionGate,
};
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

struct CountingApprover {
    answer: bool,
    calls: Arc<AtomicUsize>,
}

impl Approver for CountingApprover {
    fn request(&self, _command: &str) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer
    }
}

#[test]
fn test_safe_command_never_asks() {
    let temp = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = PermissionGate::new(
        temp.path().join("approvals.json"),
        Box::new(CountingApprover { answer: false, calls: calls.clone() }),
    )
    .unwrap();

    assert_eq!(gate.check("ls -la").unwrap(), ApprovalDecision::Safe);
    assert_eq!(gate.check("cat /etc/hostname").unwrap(), ApprovalDecision::Safe);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!temp.path().join("approvals.json").exists());
}

#[test]
fn test_approval_is_exact_text_only() {
    let temp = TempDir::new().unwrap();
    let gate = PermissionGate::with_safe_commands(
        temp.path().join("approvals.json"),
        vec!["ls".to_string()],
        Box::new(ApproveAll),
    )
    .unwrap();

    assert_eq!(
        gate.check("git push origin main").unwrap(),
        ApprovalDecision::Approved
    );
    assert_eq!(
        gate.classify("git push origin main"),
        ApprovalDecision::Approved
    );
    assert_eq!(
        gate.classify("git push origin dev"),
        ApprovalDecision::NeedsApproval
    );
}

#[test]
fn test_decisions_asked_once_and_persisted() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("approvals.json");
    let calls = Arc::new(AtomicUsize::new(0));

    {
        let gate = PermissionGate::new(
            &path,
            Box::new(CountingApprover { answer: false, calls: calls.clone() }),
        )
        .unwrap();
        assert_eq!(gate.check("rm -rf build").unwrap(), ApprovalDecision::Denied);
        assert_eq!(gate.check("rm -rf build").unwrap(), ApprovalDecision::Denied);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    let content = fs::read_to_string(&path).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(parsed["denied"][0], "rm -rf build");
    assert_eq!(parsed["allowed"].as_array().unwrap().len(), 0);

    let reloaded = PermissionGate::new(&path, Box::new(ApproveAll)).unwrap();
    assert_eq!(reloaded.classify("rm -rf build"), ApprovalDecision::Denied);
    assert_eq!(reloaded.check("rm -rf build").unwrap(), ApprovalDecision::Denied);
}

#[test]
fn test_new_decision_overwrites_old_one() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("approvals.json");
    let gate = PermissionGate::new(&path, Box::new(DenyAll)).unwrap();

    assert_eq!(gate.check("make deploy").unwrap(), ApprovalDecision::Denied);
    gate.record("make deploy", true).unwrap();
    assert_eq!(gate.classify("make deploy"), ApprovalDecision::Approved);

    let parsed: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(parsed["allowed"][0], "make deploy");
    assert_eq!(parsed["denied"].as_array().unwrap().len(), 0);
}

#[test]
fn test_existing_store_loaded_at_startup() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("approvals.json");
    fs::write(
        &path,
        r#"{"allowed": ["docker ps"], "denied": ["shutdown now"]}"#,
    )
    .unwrap();

    let gate = PermissionGate::new(&path, Box::new(DenyAll)).unwrap();
    assert_eq!(gate.classify("docker ps"), ApprovalDecision::Approved);
    assert_eq!(gate.classify("shutdown now"), ApprovalDecision::Denied);
    assert_eq!(gate.classify("docker ps -a"), ApprovalDecision::NeedsApproval);
}

#[test]
fn test_unreadable_store_is_fatal() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("approvals.json");
    fs::write(&path, "{not json").unwrap();

    assert!(PermissionGate::new(&path, Box::new(DenyAll)).is_err());
}

#[test]
fn test_store_parent_created_on_first_decision() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("nested").join("exec-approvals.json");
    let gate = PermissionGate::new(&path, Box::new(ApproveAll)).unwrap();

    gate.check("cargo build").unwrap();
    assert!(path.exists());
}
