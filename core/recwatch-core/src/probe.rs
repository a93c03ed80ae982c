//! Best-effort member access onto opaque platform descriptor handles.
//!
//! Recording descriptors carry fields the public platform surface does not
//! expose (the client port id, the owning package). Which of them exist
//! depends on the platform version, so nothing here assumes a member is
//! present: every accessor answers with a tri-state [`FieldValue`] and a
//! lookup failure degrades to `NotRetrievable` rather than propagating.
//!
//! Hosts must be granted a one-time exemption per target type before
//! member access succeeds. The grant outcome is logged but never blocks:
//! after a failed grant the accessors simply keep answering "N/R".

use crate::rolling::RollingLog;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Mutex;

/// Tri-state result of probing a descriptor member.
///
/// `NotApplicable` means the member was retrievable but the platform
/// explicitly reports "no value" (an id of `-1`, an empty string).
/// `NotRetrievable` means the member is absent on this platform version
/// or the invocation failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Present(String),
    NotApplicable,
    NotRetrievable,
}

impl FieldValue {
    pub fn as_str(&self) -> &str {
        match self {
            FieldValue::Present(value) => value,
            FieldValue::NotApplicable => "N/A",
            FieldValue::NotRetrievable => "N/R",
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, FieldValue::Present(_))
    }

    /// Integer form, if the value is present and parses.
    pub fn parse_i32(&self) -> Option<i32> {
        match self {
            FieldValue::Present(value) => value.parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque descriptor instance as delivered by the platform feed.
///
/// The engine never interprets `raw`; only the [`MemberHost`] that
/// produced the handle knows its layout.
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptorHandle {
    pub type_name: String,
    pub raw: Value,
}

impl DescriptorHandle {
    pub fn new(type_name: impl Into<String>, raw: Value) -> Self {
        Self {
            type_name: type_name.into(),
            raw,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("member not found: {0}")]
    MemberNotFound(String),

    #[error("invocation failed: {0}")]
    InvocationFailed(String),

    #[error("unexpected return type for {0}")]
    UnexpectedType(String),

    #[error("exemption not granted for {0}")]
    ExemptionDenied(String),
}

/// Platform seam for reflective member access.
///
/// The production implementation binds to the platform runtime; tests and
/// the replay daemon provide table- or JSON-backed hosts.
pub trait MemberHost: Send + Sync {
    /// One-time, process-wide capability grant for a type signature.
    /// Returns whether the grant succeeded.
    fn grant_exemption(&self, type_signature: &str) -> bool;

    /// Names of the accessible members of `type_name`.
    fn members(&self, type_name: &str) -> Result<Vec<String>, ProbeError>;

    /// Invokes `member`; `instance` is `None` for static members.
    fn invoke(
        &self,
        type_name: &str,
        instance: Option<&DescriptorHandle>,
        member: &str,
        args: &[Value],
    ) -> Result<Value, ProbeError>;
}

/// Degrading wrapper around a [`MemberHost`].
///
/// Call sites never see a probe failure; they see a sentinel.
pub struct Prober {
    host: Box<dyn MemberHost>,
    granted: Mutex<HashSet<String>>,
    log: RollingLog,
}

impl Prober {
    pub fn new(host: Box<dyn MemberHost>, log: RollingLog) -> Self {
        Self {
            host,
            granted: Mutex::new(HashSet::new()),
            log,
        }
    }

    /// Requests the exemption grant for a type exactly once per process.
    /// A failed grant is logged and never retried; later accesses keep
    /// going and answer "N/R".
    fn ensure_grant(&self, type_name: &str) {
        let first_use = self
            .granted
            .lock()
            .map(|mut granted| granted.insert(type_name.to_string()))
            .unwrap_or(false);
        if first_use {
            let ok = self.host.grant_exemption(type_name);
            self.log.system(format!(
                "{type_name} API exemption status: {}",
                if ok { "OK" } else { "Error" }
            ));
        }
    }

    fn call(
        &self,
        handle: &DescriptorHandle,
        instance: Option<&DescriptorHandle>,
        member: &str,
        args: &[Value],
    ) -> Result<Value, ProbeError> {
        self.ensure_grant(&handle.type_name);
        let members = self.host.members(&handle.type_name)?;
        if !members.iter().any(|name| name == member) {
            return Err(ProbeError::MemberNotFound(member.to_string()));
        }
        self.host.invoke(&handle.type_name, instance, member, args)
    }

    /// Integer member; `-1` maps to "N/A", any failure to "N/R".
    pub fn int_member(&self, handle: &DescriptorHandle, member: &str) -> FieldValue {
        match self.call(handle, Some(handle), member, &[]) {
            Ok(Value::Number(number)) => match number.as_i64() {
                Some(-1) => FieldValue::NotApplicable,
                Some(value) => FieldValue::Present(value.to_string()),
                None => FieldValue::NotRetrievable,
            },
            Ok(_) => FieldValue::NotRetrievable,
            Err(err) => {
                tracing::debug!(member, error = %err, "descriptor member probe failed");
                FieldValue::NotRetrievable
            }
        }
    }

    /// String member; an empty string maps to "N/A", any failure to "N/R".
    pub fn string_member(&self, handle: &DescriptorHandle, member: &str) -> FieldValue {
        match self.call(handle, Some(handle), member, &[]) {
            Ok(Value::String(value)) => {
                if value.is_empty() {
                    FieldValue::NotApplicable
                } else {
                    FieldValue::Present(value)
                }
            }
            Ok(_) => FieldValue::NotRetrievable,
            Err(err) => {
                tracing::debug!(member, error = %err, "descriptor member probe failed");
                FieldValue::NotRetrievable
            }
        }
    }

    /// Static string member invoked with the descriptor as its argument
    /// (the platform's log-friendly formatter is shaped this way).
    pub fn static_string_member(&self, handle: &DescriptorHandle, member: &str) -> FieldValue {
        match self.call(handle, None, member, &[handle.raw.clone()]) {
            Ok(Value::String(value)) => {
                if value.is_empty() {
                    FieldValue::NotApplicable
                } else {
                    FieldValue::Present(value)
                }
            }
            Ok(_) => FieldValue::NotRetrievable,
            Err(err) => {
                tracing::debug!(member, error = %err, "descriptor member probe failed");
                FieldValue::NotRetrievable
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeHost {
        grant_ok: bool,
        grants_requested: AtomicUsize,
    }

    impl FakeHost {
        fn new(grant_ok: bool) -> Self {
            Self {
                grant_ok,
                grants_requested: AtomicUsize::new(0),
            }
        }
    }

    impl MemberHost for FakeHost {
        fn grant_exemption(&self, _type_signature: &str) -> bool {
            self.grants_requested.fetch_add(1, Ordering::SeqCst);
            self.grant_ok
        }

        fn members(&self, _type_name: &str) -> Result<Vec<String>, ProbeError> {
            Ok(vec![
                "getClientPortId".to_string(),
                "getClientPackageName".to_string(),
                "toLogFriendlyString".to_string(),
            ])
        }

        fn invoke(
            &self,
            _type_name: &str,
            instance: Option<&DescriptorHandle>,
            member: &str,
            _args: &[Value],
        ) -> Result<Value, ProbeError> {
            match member {
                "getClientPortId" => {
                    let raw = &instance
                        .ok_or_else(|| ProbeError::InvocationFailed("no instance".into()))?
                        .raw;
                    Ok(raw.get("portId").cloned().unwrap_or(json!(-1)))
                }
                "getClientPackageName" => Ok(json!("com.example.sound")),
                "toLogFriendlyString" => Ok(json!("session 42 active")),
                other => Err(ProbeError::MemberNotFound(other.to_string())),
            }
        }
    }

    fn handle(raw: Value) -> DescriptorHandle {
        DescriptorHandle::new("android.media.AudioRecordingConfiguration", raw)
    }

    #[test]
    fn present_member_returns_value() {
        let prober = Prober::new(Box::new(FakeHost::new(true)), RollingLog::new());
        let value = prober.int_member(&handle(json!({"portId": 940})), "getClientPortId");
        assert_eq!(value, FieldValue::Present("940".to_string()));
        assert_eq!(value.parse_i32(), Some(940));
    }

    #[test]
    fn negative_one_maps_to_not_applicable() {
        let prober = Prober::new(Box::new(FakeHost::new(true)), RollingLog::new());
        let value = prober.int_member(&handle(json!({"portId": -1})), "getClientPortId");
        assert_eq!(value, FieldValue::NotApplicable);
        assert_eq!(value.as_str(), "N/A");
        assert_eq!(value.parse_i32(), None);
    }

    #[test]
    fn missing_member_maps_to_not_retrievable() {
        let prober = Prober::new(Box::new(FakeHost::new(true)), RollingLog::new());
        let value = prober.int_member(&handle(json!({})), "getPortId");
        assert_eq!(value, FieldValue::NotRetrievable);
        assert_eq!(value.as_str(), "N/R");
    }

    #[test]
    fn wrong_return_type_maps_to_not_retrievable() {
        let prober = Prober::new(Box::new(FakeHost::new(true)), RollingLog::new());
        // int accessor pointed at a string-returning member
        let value = prober.int_member(&handle(json!({})), "getClientPackageName");
        assert_eq!(value, FieldValue::NotRetrievable);
    }

    #[test]
    fn static_member_formats_descriptor() {
        let prober = Prober::new(Box::new(FakeHost::new(true)), RollingLog::new());
        let value = prober.static_string_member(&handle(json!({})), "toLogFriendlyString");
        assert_eq!(value, FieldValue::Present("session 42 active".to_string()));
    }

    #[test]
    fn grant_is_requested_once_per_type() {
        let log = RollingLog::new();
        let prober = Prober::new(Box::new(FakeHost::new(true)), log.clone());
        let h = handle(json!({"portId": 1}));
        prober.int_member(&h, "getClientPortId");
        prober.int_member(&h, "getClientPortId");
        prober.string_member(&h, "getClientPackageName");

        let grant_lines: Vec<String> = log
            .entries()
            .into_iter()
            .filter(|line| line.contains("exemption status"))
            .collect();
        assert_eq!(grant_lines.len(), 1);
        assert!(grant_lines[0].contains("OK"));
    }

    #[test]
    fn failed_grant_is_logged_and_calls_continue() {
        let log = RollingLog::new();
        let prober = Prober::new(Box::new(FakeHost::new(false)), log.clone());
        let h = handle(json!({"portId": 7}));

        // Grant failure does not block the call path; the host here still
        // answers, mirroring a platform where some members work ungated.
        let value = prober.int_member(&h, "getClientPortId");
        assert_eq!(value, FieldValue::Present("7".to_string()));
        assert!(log
            .entries()
            .iter()
            .any(|line| line.contains("exemption status: Error")));
    }
}
