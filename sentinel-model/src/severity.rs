/// Audit/alert severity, matching the wire integers in §6 of the spec
/// (0 INFO, 1 WARNING, 2 SECURITY, 3 CRITICAL).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Severity {
    Info = 0,
    Warning = 1,
    Security = 2,
    Critical = 3,
}

impl Severity {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    pub const fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Info),
            1 => Some(Self::Warning),
            2 => Some(Self::Security),
            3 => Some(Self::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_u8() {
        for s in [
            Severity::Info,
            Severity::Warning,
            Severity::Security,
            Severity::Critical,
        ] {
            assert_eq!(Severity::from_u8(s.as_u8()), Some(s));
        }
    }

    #[test]
    fn orders_by_severity() {
        assert!(Severity::Info < Severity::Critical);
        assert!(Severity::Security < Severity::Critical);
    }
}
