//! Magnet URI parsing (`magnet:?xt=urn:btih:<hash>&dn=...&tr=...`).
use url::Url;

use super::{TorrentError, TorrentResult};

/// A parsed magnet link: the info hash plus whatever metadata the URI
/// volunteers (display name, tracker URLs).
///
/// Parsing here is deliberately permissive: `tr` may appear any number of
/// times in any position relative to `xt`/`dn`, and unrecognized query
/// parameters are ignored rather than rejected.
#[derive(Debug, PartialEq, Clone)]
pub struct MagnetLink {
    pub info_hash: [u8; 20],
    pub display_name: Option<String>,
    pub trackers: Vec<String>,
}

impl MagnetLink {
    pub fn parse(uri: &str) -> TorrentResult<MagnetLink> {
        if !uri.starts_with("magnet:?") {
            return Err(TorrentError::InvalidMagnetLink(
                "missing magnet:? prefix".to_string(),
            ));
        }
        let url = Url::parse(uri)?;

        let mut info_hash = None;
        let mut display_name = None;
        let mut trackers = Vec::new();

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "xt" => {
                    let hash = value
                        .strip_prefix("urn:btih:")
                        .ok_or_else(|| TorrentError::InvalidMagnetLink(
                            "xt is not an urn:btih: topic".to_string(),
                        ))?;
                    info_hash = Some(parse_hash(hash)?);
                }
                "dn" => display_name = Some(value.into_owned()),
                "tr" => trackers.push(value.into_owned()),
                _ => {}
            }
        }

        let info_hash = info_hash.ok_or_else(|| {
            TorrentError::InvalidMagnetLink("missing xt=urn:btih: parameter".to_string())
        })?;

        Ok(MagnetLink {
            info_hash,
            display_name,
            trackers,
        })
    }
}

/// Accepts a 40-character hex info hash, case-insensitively.
///
/// The 32-character base32 form that BEP-9 also permits is out of scope:
/// none of the surrounding tooling (trackers, CLI output) produces it.
fn parse_hash(hash: &str) -> TorrentResult<[u8; 20]> {
    if hash.len() != 40 || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(TorrentError::InvalidMagnetLink(format!(
            "xt topic hash must be 40 hex characters, got {} chars",
            hash.len()
        )));
    }
    let mut out = [0u8; 20];
    for (i, chunk) in out.iter_mut().enumerate() {
        *chunk = u8::from_str_radix(&hash[i * 2..i * 2 + 2], 16)
            .map_err(|_| TorrentError::InvalidMagnetLink("non-hex digit in hash".to_string()))?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_length_hash() {
        let uri = "magnet:?xt=urn:btih:abc&dn=x";
        assert!(MagnetLink::parse(uri).is_err());
    }

    #[test]
    fn parses_full_magnet_link() {
        let hash40 = "d0d14c926e6e99761a2fdcff27b403d96376eff6";
        let uri = format!(
            "magnet:?xt=urn:btih:{hash40}&dn=some-file&tr=http%3A%2F%2Ftracker1%2Fannounce&tr=http%3A%2F%2Ftracker2%2Fannounce"
        );
        let magnet = MagnetLink::parse(&uri).unwrap();
        assert_eq!(magnet.display_name.as_deref(), Some("some-file"));
        assert_eq!(magnet.trackers.len(), 2);
        assert_eq!(magnet.trackers[0], "http://tracker1/announce");
    }

    #[test]
    fn accepts_uppercase_hex_and_missing_dn_tr() {
        let uri = "magnet:?xt=urn:btih:D0D14C926E6E99761A2FDCFF27B403D96376EFF";
        // 39 chars above is intentionally short to confirm rejection:
        assert!(MagnetLink::parse(uri).is_err());

        let valid = "magnet:?xt=urn:btih:D0D14C926E6E99761A2FDCFF27B403D96376EFF6";
        let magnet = MagnetLink::parse(valid).unwrap();
        assert!(magnet.display_name.is_none());
        assert!(magnet.trackers.is_empty());
    }

    #[test]
    fn tr_before_xt_is_accepted() {
        let uri = "magnet:?tr=http%3A%2F%2Ftracker%2Fannounce&xt=urn:btih:d0d14c926e6e99761a2fdcff27b403d96376eff6";
        let magnet = MagnetLink::parse(uri).unwrap();
        assert_eq!(magnet.trackers, vec!["http://tracker/announce"]);
    }

    #[test]
    fn rejects_missing_magnet_prefix() {
        assert!(MagnetLink::parse("http://example.com").is_err());
    }
}
