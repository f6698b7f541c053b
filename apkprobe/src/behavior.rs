//! Reduction of captured telemetry into a fixed schema behavior profile.
//!
//! Each [Signal] owns a set of literal marker tokens. A signal's count is the
//! sum over its markers of the case sensitive, non-overlapping occurrence
//! count of that marker in the telemetry text. Only signals with a non-zero
//! count are kept.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

use serde::Serialize;

use crate::telemetry::TelemetryBuffer;

/// The fixed vocabulary of behavior signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    NetworkCalls,
    FileOperations,
    SmsActivity,
    LocationAccess,
    CameraUsage,
    ContactsAccess,
    PhoneCalls,
    PermissionRequests,
    Crashes,
    NativeCode,
    CryptoOperations,
    DatabaseOperations,
}

impl Signal {
    pub const ALL: [Signal; 12] = [
        Self::NetworkCalls,
        Self::FileOperations,
        Self::SmsActivity,
        Self::LocationAccess,
        Self::CameraUsage,
        Self::ContactsAccess,
        Self::PhoneCalls,
        Self::PermissionRequests,
        Self::Crashes,
        Self::NativeCode,
        Self::CryptoOperations,
        Self::DatabaseOperations,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::NetworkCalls => "network_calls",
            Self::FileOperations => "file_operations",
            Self::SmsActivity => "sms_activity",
            Self::LocationAccess => "location_access",
            Self::CameraUsage => "camera_usage",
            Self::ContactsAccess => "contacts_access",
            Self::PhoneCalls => "phone_calls",
            Self::PermissionRequests => "permission_requests",
            Self::Crashes => "crashes",
            Self::NativeCode => "native_code",
            Self::CryptoOperations => "crypto_operations",
            Self::DatabaseOperations => "database_operations",
        }
    }

    /// The literal tokens counted for this signal
    pub fn markers(&self) -> &'static [&'static str] {
        match self {
            Self::NetworkCalls => &["http://", "https://"],
            Self::FileOperations => &["FileOutputStream", "FileInputStream"],
            Self::SmsActivity => &["SMS", "sendTextMessage"],
            Self::LocationAccess => &["LocationManager", "getLastKnownLocation"],
            Self::CameraUsage => &["Camera", "takePicture"],
            Self::ContactsAccess => &["ContactsContract"],
            Self::PhoneCalls => &["ACTION_CALL", "TelephonyManager"],
            Self::PermissionRequests => &["permission"],
            Self::Crashes => &["FATAL EXCEPTION"],
            Self::NativeCode => &["JNI", "native"],
            Self::CryptoOperations => &["Cipher", "encrypt"],
            Self::DatabaseOperations => &["SQLite", "database"],
        }
    }

    /// Count this signal's markers in `text`
    pub fn count_in(&self, text: &str) -> u64 {
        self.markers()
            .iter()
            .map(|m| text.matches(m).count() as u64)
            .sum()
    }
}

impl Display for Signal {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Active signal counts. Every entry is at least 1.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct BehaviorProfile {
    counts: BTreeMap<Signal, u64>,
}

impl BehaviorProfile {
    /// Count every signal over the same snapshot of `text`
    pub fn from_telemetry(text: &str) -> Self {
        if text.is_empty() {
            return Self::default();
        }
        let counts = Signal::ALL
            .iter()
            .map(|s| (*s, s.count_in(text)))
            .filter(|(_, n)| *n > 0)
            .collect();
        Self { counts }
    }

    pub fn get(&self, signal: Signal) -> Option<u64> {
        self.counts.get(&signal).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Signal, u64)> + '_ {
        self.counts.iter().map(|(s, n)| (*s, *n))
    }

    /// Sum of every active count
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }
}

impl Display for BehaviorProfile {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (signal, n)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", signal, n)?;
        }
        f.write_str("}")
    }
}

/// Consume a telemetry buffer, producing its profile
pub fn extract(buffer: TelemetryBuffer) -> BehaviorProfile {
    BehaviorProfile::from_telemetry(buffer.as_str())
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::*;
    use serde_json::json;

    const SAMPLE: &str = "\
10-19 12:00:01.000  1234  1234 I Net     : GET http://tracker.example/a
10-19 12:00:01.100  1234  1234 I Net     : GET http://tracker.example/b
10-19 12:00:01.200  1234  1234 I Net     : POST https://c2.example/upload
10-19 12:00:02.000  1234  1240 E AndroidRuntime: FATAL EXCEPTION: main
10-19 12:00:02.001  1234  1240 W Store   : opened database /data/data/x/a.db
";

    #[test]
    fn test_empty() {
        assert!(BehaviorProfile::from_telemetry("").is_empty());
        assert!(extract(TelemetryBuffer::empty()).is_empty());
    }

    #[test]
    fn test_network_and_crash_counts() {
        let p = BehaviorProfile::from_telemetry(SAMPLE);
        assert_eq!(p.get(Signal::NetworkCalls), Some(3));
        assert_eq!(p.get(Signal::Crashes), Some(1));
        assert_eq!(p.get(Signal::DatabaseOperations), Some(1));
        assert_eq!(p.get(Signal::SmsActivity), None);
        assert_eq!(p.len(), 3);
        assert_eq!(p.total(), 5);
    }

    #[test]
    fn test_no_crash_key_absent() {
        let p = BehaviorProfile::from_telemetry("I ActivityManager: Start proc com.example");
        assert_eq!(p.get(Signal::Crashes), None);
    }

    #[test]
    fn test_pure() {
        let a = BehaviorProfile::from_telemetry(SAMPLE);
        let b = BehaviorProfile::from_telemetry(SAMPLE);
        assert_eq!(a, b);
    }

    #[rstest]
    #[case("", 0)]
    #[case("aaaa", 0)]
    #[case("SMSSMS", 2)]
    #[case("sms SMS Sms", 1)]
    #[case("sendTextMessage SMS", 2)]
    fn test_sms_counts(#[case] text: &str, #[case] expected: u64) {
        assert_eq!(Signal::SmsActivity.count_in(text), expected);
    }

    #[test]
    fn test_non_overlapping() {
        // "http://" inside "https://" doesn't exist, but repeated markers
        // must not overlap either
        assert_eq!(Signal::NetworkCalls.count_in("http://http://"), 2);
        assert_eq!(Signal::Crashes.count_in("FATAL EXCEPTIONFATAL EXCEPTION"), 2);
    }

    #[test]
    fn test_every_key_active() {
        let mut text = String::new();
        for s in Signal::ALL {
            text.push_str(s.markers()[0]);
            text.push('\n');
        }
        let p = BehaviorProfile::from_telemetry(&text);
        assert_eq!(p.len(), Signal::ALL.len());
        assert!(p.iter().all(|(_, n)| n >= 1));
    }

    #[test]
    fn test_serialize_names() {
        let p = BehaviorProfile::from_telemetry("https://x https://y SMS");
        assert_eq!(
            serde_json::to_value(&p).unwrap(),
            json!({"network_calls": 2, "sms_activity": 1})
        );
        for s in Signal::ALL {
            assert_eq!(serde_json::to_value(s).unwrap(), json!(s.name()));
        }
    }

    #[test]
    fn test_display() {
        let p = BehaviorProfile::from_telemetry("https://x SMS");
        assert_eq!(p.to_string(), "{network_calls: 1, sms_activity: 1}");
    }

    #[rstest]
    #[case(Signal::NetworkCalls, &["http://", "https://"])]
    #[case(Signal::FileOperations, &["FileOutputStream", "FileInputStream"])]
    #[case(Signal::SmsActivity, &["SMS", "sendTextMessage"])]
    #[case(Signal::LocationAccess, &["LocationManager", "getLastKnownLocation"])]
    #[case(Signal::CameraUsage, &["Camera", "takePicture"])]
    #[case(Signal::ContactsAccess, &["ContactsContract"])]
    #[case(Signal::PhoneCalls, &["ACTION_CALL", "TelephonyManager"])]
    #[case(Signal::PermissionRequests, &["permission"])]
    #[case(Signal::Crashes, &["FATAL EXCEPTION"])]
    #[case(Signal::NativeCode, &["JNI", "native"])]
    #[case(Signal::CryptoOperations, &["Cipher", "encrypt"])]
    #[case(Signal::DatabaseOperations, &["SQLite", "database"])]
    fn test_marker_table(#[case] signal: Signal, #[case] markers: &[&str]) {
        assert_eq!(signal.markers(), markers);
    }
}
