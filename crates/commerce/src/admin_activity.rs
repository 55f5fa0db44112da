//! Hash-chained admin activity log.
//!
//! Every entry's `entryHash` is an HMAC-SHA256 over the canonical JSON of
//! the entry minus the hash itself; `prevHash` links to the previous
//! entry. Tampering with any entry breaks every downstream hash.

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use std::sync::Arc;

use oc_domain::commerce::{ActivityChanges, AdminActivityEntry};
use oc_store::Store;

type HmacSha256 = Hmac<Sha256>;

/// Stored per entry so a future canonical-encoder change can coexist with
/// already-written chains.
const HASH_VERSION: &str = "v1";

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityIssue {
    pub id: String,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_prev_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_prev_hash: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub ok: bool,
    pub total: usize,
    pub issues: Vec<IntegrityIssue>,
}

pub struct AdminActivityService {
    store: Arc<Store>,
    secret: String,
}

impl AdminActivityService {
    pub fn new(store: Arc<Store>, secret: &str) -> Self {
        let secret = secret.trim();
        Self {
            store,
            secret: if secret.is_empty() {
                "replace-with-strong-secret".to_owned()
            } else {
                secret.to_owned()
            },
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn record(
        &self,
        admin_id: &str,
        admin_email: &str,
        action: &str,
        resource: &str,
        resource_id: &str,
        before: Option<Value>,
        after: Option<Value>,
        ip_address: &str,
        user_agent: &str,
    ) -> AdminActivityEntry {
        let prev_hash = self.store.last_admin_entry_hash();
        let mut entry = AdminActivityEntry {
            id: self.store.ids.next("admin_log"),
            admin_id: admin_id.to_owned(),
            admin_email: admin_email.to_owned(),
            action: action.to_owned(),
            resource: resource.to_owned(),
            resource_id: resource_id.to_owned(),
            changes: ActivityChanges { before, after },
            ip_address: ip_address.to_owned(),
            user_agent: user_agent.to_owned(),
            timestamp: self.store.now(),
            prev_hash,
            hash_version: HASH_VERSION.into(),
            entry_hash: String::new(),
        };
        entry.entry_hash = self.compute_entry_hash(&entry);
        self.store.append_admin_activity(entry.clone());
        entry
    }

    pub fn list_recent(&self, limit: usize) -> Vec<AdminActivityEntry> {
        self.store.admin_activity_tail(limit.clamp(1, 500))
    }

    /// Rebuild the chain over the last `limit` entries and report every
    /// break: `prev_hash_mismatch`, `missing_entry_hash`,
    /// `entry_hash_mismatch`.
    pub fn verify_integrity(&self, limit: usize) -> IntegrityReport {
        let logs = self.store.admin_activity_tail(limit.clamp(1, 10_000));
        if logs.is_empty() {
            return IntegrityReport {
                ok: true,
                total: 0,
                issues: Vec::new(),
            };
        }

        let mut issues = Vec::new();
        let mut expected_prev = String::new();
        for row in &logs {
            if row.prev_hash != expected_prev {
                issues.push(IntegrityIssue {
                    id: row.id.clone(),
                    error: "prev_hash_mismatch".into(),
                    expected_prev_hash: Some(expected_prev.clone()),
                    actual_prev_hash: Some(row.prev_hash.clone()),
                });
            }
            let expected_entry = self.compute_entry_hash(row);
            if row.entry_hash.is_empty() {
                issues.push(IntegrityIssue {
                    id: row.id.clone(),
                    error: "missing_entry_hash".into(),
                    expected_prev_hash: None,
                    actual_prev_hash: None,
                });
            } else if row.entry_hash != expected_entry {
                issues.push(IntegrityIssue {
                    id: row.id.clone(),
                    error: "entry_hash_mismatch".into(),
                    expected_prev_hash: None,
                    actual_prev_hash: None,
                });
            }
            expected_prev = row.entry_hash.clone();
        }

        IntegrityReport {
            ok: issues.is_empty(),
            total: logs.len(),
            issues,
        }
    }

    fn compute_entry_hash(&self, entry: &AdminActivityEntry) -> String {
        let canonical = canonical_json(&serde_json::json!({
            "id": entry.id,
            "adminId": entry.admin_id,
            "adminEmail": entry.admin_email,
            "action": entry.action,
            "resource": entry.resource,
            "resourceId": entry.resource_id,
            "changes": {
                "before": entry.changes.before,
                "after": entry.changes.after,
            },
            "ipAddress": entry.ip_address,
            "userAgent": entry.user_agent,
            "timestamp": entry.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
            "prevHash": entry.prev_hash,
            "hashVersion": entry.hash_version,
        }));
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(canonical.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

/// Canonical JSON: object keys sorted, minimum whitespace. Arrays keep
/// their order.
pub fn canonical_json(value: &Value) -> String {
    fn write(value: &Value, out: &mut String) {
        match value {
            Value::Object(map) => {
                out.push('{');
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(&serde_json::to_string(key).expect("string encodes"));
                    out.push(':');
                    write(&map[*key], out);
                }
                out.push('}');
            }
            Value::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    write(item, out);
                }
                out.push(']');
            }
            other => out.push_str(&other.to_string()),
        }
    }
    let mut out = String::new();
    write(value, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn service() -> AdminActivityService {
        AdminActivityService::new(Arc::new(Store::new()), "test-secret")
    }

    fn record_n(service: &AdminActivityService, n: usize) -> Vec<AdminActivityEntry> {
        (0..n)
            .map(|i| {
                service.record(
                    "admin_1",
                    "admin@example.com",
                    "update",
                    "voice_settings",
                    &format!("res_{i}"),
                    Some(json!({"enabled": false})),
                    Some(json!({"enabled": true})),
                    "127.0.0.1",
                    "cli",
                )
            })
            .collect()
    }

    #[test]
    fn canonical_json_sorts_keys_and_strips_whitespace() {
        let value = json!({"b": 1, "a": {"z": true, "y": [1, 2]}});
        assert_eq!(canonical_json(&value), r#"{"a":{"y":[1,2],"z":true},"b":1}"#);
    }

    #[test]
    fn chain_links_prev_hash() {
        let service = service();
        let entries = record_n(&service, 3);
        assert_eq!(entries[0].prev_hash, "");
        assert_eq!(entries[1].prev_hash, entries[0].entry_hash);
        assert_eq!(entries[2].prev_hash, entries[1].entry_hash);
    }

    #[test]
    fn untouched_chain_verifies_clean() {
        let service = service();
        record_n(&service, 5);
        let report = service.verify_integrity(100);
        assert!(report.ok, "issues: {:?}", report.issues);
        assert_eq!(report.total, 5);
    }

    #[test]
    fn tampered_entry_is_detected_downstream() {
        let store = Arc::new(Store::new());
        let service = AdminActivityService::new(store.clone(), "test-secret");
        record_n(&service, 3);

        // Tamper with the middle entry in place.
        let mut logs = store.admin_activity_tail(100);
        logs[1].action = "delete".into();
        // Rebuild the store content with the tampered row.
        let fresh = Store::new();
        for row in &logs {
            fresh.append_admin_activity(row.clone());
        }
        let tampered = AdminActivityService::new(Arc::new(fresh), "test-secret");
        let report = tampered.verify_integrity(100);
        assert!(!report.ok);
        assert!(report
            .issues
            .iter()
            .any(|issue| issue.error == "entry_hash_mismatch"));
    }

    #[test]
    fn broken_link_reports_prev_hash_mismatch() {
        let store = Arc::new(Store::new());
        let service = AdminActivityService::new(store.clone(), "test-secret");
        record_n(&service, 3);

        let mut logs = store.admin_activity_tail(100);
        logs[2].prev_hash = "forged".into();
        let fresh = Store::new();
        for row in &logs {
            fresh.append_admin_activity(row.clone());
        }
        let tampered = AdminActivityService::new(Arc::new(fresh), "test-secret");
        let report = tampered.verify_integrity(100);
        assert!(report
            .issues
            .iter()
            .any(|issue| issue.error == "prev_hash_mismatch"));
    }

    #[test]
    fn forged_root_prev_hash_is_flagged() {
        // The chain root must anchor at "", so a forged prevHash on the
        // very first entry cannot pass by matching itself.
        let store = Arc::new(Store::new());
        let service = AdminActivityService::new(store.clone(), "test-secret");
        record_n(&service, 2);

        let mut logs = store.admin_activity_tail(100);
        logs[0].prev_hash = "forged".into();
        let fresh = Store::new();
        for row in &logs {
            fresh.append_admin_activity(row.clone());
        }
        let tampered = AdminActivityService::new(Arc::new(fresh), "test-secret");
        let report = tampered.verify_integrity(100);
        assert!(!report.ok);
        let issue = report
            .issues
            .iter()
            .find(|issue| issue.error == "prev_hash_mismatch")
            .expect("expected a prev_hash_mismatch on the root entry");
        assert_eq!(issue.id, logs[0].id);
        assert_eq!(issue.expected_prev_hash.as_deref(), Some(""));
    }

    #[test]
    fn empty_chain_is_ok() {
        let report = service().verify_integrity(100);
        assert!(report.ok);
        assert_eq!(report.total, 0);
    }
}
