use core::fmt;
use core::str::FromStr;

use crate::enums::ProtocolVersion;
use crate::error::{Error, PeerIncompatible};
use crate::suites::Rc4Policy;

/// A security grade for one connection, chosen per cluster by the
/// proxy.  It sets the lowest acceptable version and how RC4 is treated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Grade {
    /// TLS 1.2 only, no RC4.
    APlus,
    /// TLS 1.0 and later, no RC4.
    A,
    /// RC4 only for SSLv3 clients, which have nothing better.
    B,
    /// Anything goes.
    C,
}

impl Grade {
    /// Rejects a negotiated version below this grade's floor.
    pub fn check_version(self, version: ProtocolVersion) -> Result<(), Error> {
        let floor = match self {
            Self::APlus => ProtocolVersion::TLSv1_2,
            Self::A => ProtocolVersion::TLSv1_0,
            Self::B | Self::C => return Ok(()),
        };

        match version.at_least(floor) {
            true => Ok(()),
            false => Err(PeerIncompatible::VersionBelowGradeFloor.into()),
        }
    }

    /// `poodle_defence` forces RC4 for SSLv3 under grade C, since every
    /// SSLv3 CBC suite is exposed to POODLE.
    pub fn rc4_policy(self, version: ProtocolVersion, poodle_defence: bool) -> Rc4Policy {
        let ssl3 = !version.at_least(ProtocolVersion::TLSv1_0);
        match self {
            Self::APlus | Self::A => Rc4Policy::Disable,
            Self::B if ssl3 => Rc4Policy::Only,
            Self::B => Rc4Policy::Disable,
            Self::C if ssl3 && poodle_defence => Rc4Policy::Only,
            Self::C => Rc4Policy::Enable,
        }
    }
}

impl Default for Grade {
    fn default() -> Self {
        Self::A
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::APlus => "A+",
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
        })
    }
}

impl FromStr for Grade {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A+" => Ok(Self::APlus),
            "A" => Ok(Self::A),
            "B" => Ok(Self::B),
            "C" => Ok(Self::C),
            _ => Err(Error::InvalidConfig(format!("unknown grade {:?}", s))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::AlertDescription;

    #[test]
    fn version_floors() {
        let err = Grade::APlus
            .check_version(ProtocolVersion::TLSv1_1)
            .unwrap_err();
        assert_eq!(err.alert(), Some(AlertDescription::ProtocolVersion));
        assert!(Grade::APlus
            .check_version(ProtocolVersion::TLSv1_2)
            .is_ok());
        assert!(Grade::A
            .check_version(ProtocolVersion::SSLv3)
            .is_err());
        assert!(Grade::A
            .check_version(ProtocolVersion::TLSv1_0)
            .is_ok());
        assert!(Grade::C
            .check_version(ProtocolVersion::SSLv3)
            .is_ok());
    }

    #[test]
    fn rc4_policies() {
        use ProtocolVersion::*;
        assert_eq!(Grade::APlus.rc4_policy(TLSv1_2, false), Rc4Policy::Disable);
        assert_eq!(Grade::A.rc4_policy(TLSv1_0, true), Rc4Policy::Disable);
        assert_eq!(Grade::B.rc4_policy(SSLv3, false), Rc4Policy::Only);
        assert_eq!(Grade::B.rc4_policy(TLSv1_0, false), Rc4Policy::Disable);
        assert_eq!(Grade::C.rc4_policy(SSLv3, false), Rc4Policy::Enable);
        assert_eq!(Grade::C.rc4_policy(SSLv3, true), Rc4Policy::Only);
        assert_eq!(Grade::C.rc4_policy(TLSv1_2, true), Rc4Policy::Enable);
    }

    #[test]
    fn parses_and_prints() {
        for grade in [Grade::APlus, Grade::A, Grade::B, Grade::C] {
            assert_eq!(grade.to_string().parse::<Grade>().unwrap(), grade);
        }
        assert!("D".parse::<Grade>().is_err());
    }
}
