//! Freshness of stapled OCSP responses.
//!
//! Only the validity window of the first `SingleResponse` is read; the
//! response was checked by whoever fetched it.

use std::time::{Duration, SystemTime};

use der::asn1::GeneralizedTime;
use der::{Decode, DecodeValue, Header, Reader, SliceReader, Tag};

use crate::error::{Error, InvalidMessage};

/// Staples are withdrawn this long before they expire, and not used
/// until this long after they were produced.
const FRESHNESS_MARGIN: Duration = Duration::from_secs(60 * 60);

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct OcspTimes {
    pub(crate) this_update: SystemTime,
    pub(crate) next_update: Option<SystemTime>,
}

impl OcspTimes {
    /// `thisUpdate - 1h <= now <= nextUpdate - 1h`.  A response without
    /// `nextUpdate` is never fresh.
    pub(crate) fn is_fresh(&self, now: SystemTime) -> bool {
        let Some(next_update) = self.next_update else {
            return false;
        };

        let not_before = self
            .this_update
            .checked_sub(FRESHNESS_MARGIN)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let not_after = next_update
            .checked_sub(FRESHNESS_MARGIN)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        not_before <= now && now <= not_after
    }
}

/// Whether `response` may be stapled at `now`.  Unparseable responses
/// are not.
pub(crate) fn is_fresh(response: &[u8], now: SystemTime) -> bool {
    read_times(response)
        .map(|times| times.is_fresh(now))
        .unwrap_or(false)
}

/// Reads `thisUpdate` and `nextUpdate` from a DER `OCSPResponse`.
pub(crate) fn read_times(response: &[u8]) -> Result<OcspTimes, Error> {
    walk(response).map_err(|_| InvalidMessage::InvalidOcspResponse.into())
}

struct Tlv<'a> {
    header: Header,
    body: &'a [u8],
}

fn next<'a>(r: &mut SliceReader<'a>) -> der::Result<Tlv<'a>> {
    let header = Header::decode(r)?;
    let body = r.read_slice(header.length)?;
    Ok(Tlv { header, body })
}

fn expect<'a>(r: &mut SliceReader<'a>, tag: Tag) -> der::Result<Tlv<'a>> {
    let tlv = next(r)?;
    tlv.header.tag.assert_eq(tag)?;
    Ok(tlv)
}

fn is_context(tag: Tag, number: u8) -> bool {
    matches!(tag, Tag::ContextSpecific { number: n, .. } if n.value() == number)
}

fn time(tlv: &Tlv<'_>) -> der::Result<SystemTime> {
    tlv.header.tag.assert_eq(Tag::GeneralizedTime)?;
    let mut r = SliceReader::new(tlv.body)?;
    Ok(GeneralizedTime::decode_value(&mut r, tlv.header)?.to_system_time())
}

fn walk(response: &[u8]) -> der::Result<OcspTimes> {
    // OCSPResponse ::= SEQUENCE { responseStatus, [0] responseBytes }
    let mut r = SliceReader::new(response)?;
    let outer = expect(&mut r, Tag::Sequence)?;
    let mut r = SliceReader::new(outer.body)?;
    let status = expect(&mut r, Tag::Enumerated)?;
    if status.body != &[0u8][..] {
        return Err(Tag::Enumerated.value_error());
    }

    let bytes = next(&mut r)?;
    if !is_context(bytes.header.tag, 0) {
        return Err(bytes.header.tag.unexpected_error(None));
    }

    // ResponseBytes ::= SEQUENCE { responseType, response OCTET STRING }
    let mut r = SliceReader::new(bytes.body)?;
    let response_bytes = expect(&mut r, Tag::Sequence)?;
    let mut r = SliceReader::new(response_bytes.body)?;
    expect(&mut r, Tag::ObjectIdentifier)?;
    let basic = expect(&mut r, Tag::OctetString)?;

    // BasicOCSPResponse ::= SEQUENCE { tbsResponseData, ... }
    let mut r = SliceReader::new(basic.body)?;
    let basic = expect(&mut r, Tag::Sequence)?;
    let mut r = SliceReader::new(basic.body)?;
    let tbs = expect(&mut r, Tag::Sequence)?;

    // ResponseData ::= SEQUENCE { [0] version OPTIONAL, responderID,
    //   producedAt, responses, ... }
    let mut r = SliceReader::new(tbs.body)?;
    let first = next(&mut r)?;
    if is_context(first.header.tag, 0) {
        // the version was present, so skip the responderID too
        next(&mut r)?;
    }
    expect(&mut r, Tag::GeneralizedTime)?;
    let responses = expect(&mut r, Tag::Sequence)?;

    // SingleResponse ::= SEQUENCE { certID, certStatus, thisUpdate,
    //   [0] nextUpdate OPTIONAL, ... }
    let mut r = SliceReader::new(responses.body)?;
    let single = expect(&mut r, Tag::Sequence)?;
    let mut r = SliceReader::new(single.body)?;
    expect(&mut r, Tag::Sequence)?;
    next(&mut r)?;
    let this_update = time(&next(&mut r)?)?;

    let mut next_update = None;
    if !r.is_finished() {
        let field = next(&mut r)?;
        if is_context(field.header.tag, 0) {
            let mut inner = SliceReader::new(field.body)?;
            next_update = Some(time(&next(&mut inner)?)?);
        }
    }

    Ok(OcspTimes {
        this_update,
        next_update,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    const THIS_UPDATE: u64 = 1792379221;
    const NEXT_UPDATE: u64 = 2107739221;

    fn staple() -> Vec<u8> {
        std::fs::read(concat!(env!("CARGO_MANIFEST_DIR"), "/../test-ca/rsa/end.ocsp")).unwrap()
    }

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn reads_validity_window() {
        let times = read_times(&staple()).unwrap();
        assert_eq!(times.this_update, at(THIS_UPDATE));
        assert_eq!(times.next_update, Some(at(NEXT_UPDATE)));
    }

    #[test]
    fn freshness_has_one_hour_margins() {
        let staple = staple();
        assert!(!is_fresh(&staple, at(THIS_UPDATE - 3601)));
        assert!(is_fresh(&staple, at(THIS_UPDATE - 3600)));
        assert!(is_fresh(&staple, at(THIS_UPDATE + 86400)));
        assert!(is_fresh(&staple, at(NEXT_UPDATE - 3600)));
        assert!(!is_fresh(&staple, at(NEXT_UPDATE - 3599)));
    }

    #[test]
    fn garbage_is_never_fresh() {
        assert!(!is_fresh(b"", at(THIS_UPDATE)));
        assert!(!is_fresh(&[0x30, 0x03, 0x0a, 0x01, 0x00], at(THIS_UPDATE)));
        let mut truncated = staple();
        truncated.truncate(truncated.len() / 2);
        assert!(read_times(&truncated).is_err());
    }

    #[test]
    fn unsuccessful_status_is_rejected() {
        // OCSPResponse { responseStatus: tryLater(3) }
        assert!(read_times(&[0x30, 0x03, 0x0a, 0x01, 0x03]).is_err());
    }

    #[test]
    fn missing_next_update_is_stale() {
        let times = OcspTimes {
            this_update: at(THIS_UPDATE),
            next_update: None,
        };
        assert!(!times.is_fresh(at(THIS_UPDATE + 10)));
    }
}
