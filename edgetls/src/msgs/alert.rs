use crate::enums::AlertDescription;
use crate::error::InvalidMessage;
use crate::msgs::codec::{Codec, Reader};
use crate::msgs::enums::AlertLevel;

/// Body of an alert record: `level(1) | description(1)`.
#[derive(Clone, Debug, PartialEq)]
pub struct AlertMessagePayload {
    pub level: AlertLevel,
    pub description: AlertDescription,
}

impl AlertMessagePayload {
    /// close_notify and no_renegotiation go out as warnings; every
    /// other alert we send ends the connection.
    pub(crate) fn for_description(description: AlertDescription) -> Self {
        let level = match description {
            AlertDescription::CloseNotify | AlertDescription::NoRenegotiation => AlertLevel::Warning,
            _ => AlertLevel::Fatal,
        };
        Self { level, description }
    }
}

impl Codec<'_> for AlertMessagePayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.level.encode(bytes);
        self.description.encode(bytes);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let level = AlertLevel::read(r)?;
        let description = AlertDescription::read(r)?;
        r.expect_empty("AlertMessagePayload")
            .map(|_| Self { level, description })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_for_sent_alerts() {
        assert_eq!(
            AlertMessagePayload::for_description(AlertDescription::NoRenegotiation).level,
            AlertLevel::Warning
        );
        assert_eq!(
            AlertMessagePayload::for_description(AlertDescription::BadRecordMac).level,
            AlertLevel::Fatal
        );
    }

    #[test]
    fn alert_is_exactly_two_bytes() {
        assert!(AlertMessagePayload::read_bytes(&[2]).is_err());
        assert!(AlertMessagePayload::read_bytes(&[2, 20, 0]).is_err());
        let alert = AlertMessagePayload::read_bytes(&[2, 20]).unwrap();
        assert_eq!(alert.description, AlertDescription::BadRecordMac);
        assert_eq!(alert.get_encoding(), vec![2, 20]);
    }
}
