use std::collections::BTreeMap;

use axum::headers;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::Error;

type HmacSha256 = Hmac<Sha256>;

/// Bag key holding the authenticated teacher's identifier.
pub const TEACHER_ID_KEY: &str = "teacherId";

/// Signed envelope carried inside the cookie value.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    expires_at: i64,
    bag: BTreeMap<String, String>,
}

/// Converts a session bag to and from an opaque, tamper-evident cookie
/// value: `hex(postcard(envelope)) "." hex(hmac_sha256(envelope))`.
#[derive(Debug, Clone)]
pub struct SessionCodec {
    secret: Vec<u8>,
    lifetime_secs: i64,
}

impl SessionCodec {
    pub fn new(secret: &str, lifetime_secs: i64) -> SessionCodec {
        SessionCodec {
            secret: secret.as_bytes().to_vec(),
            lifetime_secs,
        }
    }

    pub fn encode(&self, bag: &BTreeMap<String, String>) -> Result<String, Error> {
        let envelope = Envelope {
            expires_at: Utc::now().timestamp() + self.lifetime_secs,
            bag: bag.clone(),
        };
        let payload = postcard::to_allocvec(&envelope).map_err(|err| Error::InternalError {
            kind: "SerializationError",
            message: err.to_string(),
        })?;
        let tag = self.mac(&payload)?;
        Ok(format!("{}.{}", hex::encode(&payload), hex::encode(tag)))
    }

    /// Returns `None` for a missing separator, bad hex, failed MAC
    /// verification, an expired envelope, or undecodable payload bytes.
    /// Forged and stale cookies are routine, so none of these are errors.
    pub fn decode(&self, cookie_value: &str) -> Option<BTreeMap<String, String>> {
        let (payload_hex, tag_hex) = cookie_value.split_once('.')?;
        let payload = hex::decode(payload_hex).ok()?;
        let tag = hex::decode(tag_hex).ok()?;

        let mut mac = HmacSha256::new_from_slice(&self.secret).ok()?;
        mac.update(&payload);
        // verify_slice is constant-time
        mac.verify_slice(&tag).ok()?;

        let envelope: Envelope = postcard::from_bytes(&payload).ok()?;
        if envelope.expires_at < Utc::now().timestamp() {
            return None;
        }
        Some(envelope.bag)
    }

    fn mac(&self, payload: &[u8]) -> Result<Vec<u8>, Error> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).map_err(|err| Error::InternalError {
                kind: "SessionCodecError",
                message: err.to_string(),
            })?;
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

/// In-memory view of the decoded session bag. Changes are not persisted
/// until the session is committed to a response cookie.
#[derive(Debug, Clone, Default)]
pub struct Session {
    bag: BTreeMap<String, String>,
}

impl Session {
    pub fn empty() -> Session {
        Session::default()
    }

    fn from_bag(bag: BTreeMap<String, String>) -> Session {
        Session { bag }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.bag.get(key).map(String::as_str)
    }

    pub fn set<V: Into<String>>(&mut self, key: &str, value: V) {
        self.bag.insert(key.to_string(), value.into());
    }

    pub fn has(&self, key: &str) -> bool {
        self.bag.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) {
        self.bag.remove(key);
    }

    pub fn teacher_id(&self) -> Option<Uuid> {
        self.get(TEACHER_ID_KEY)
            .and_then(|raw| Uuid::parse_str(raw).ok())
    }
}

/// Cookie-backed session service: reads sessions from requests, commits
/// mutated sessions to responses, and gates protected operations.
#[derive(Debug, Clone)]
pub struct Sessions {
    codec: SessionCodec,
    cookie_name: String,
    lifetime_secs: i64,
    secure: bool,
}

impl Sessions {
    pub fn new(config: &SessionConfig) -> Sessions {
        Sessions {
            codec: SessionCodec::new(&config.secret, config.lifetime_secs),
            cookie_name: config.cookie_name.clone(),
            lifetime_secs: config.lifetime_secs,
            secure: config.secure,
        }
    }

    /// Pulls this service's cookie out of a parsed `Cookie` header.
    pub fn cookie_value<'a>(&self, header: Option<&'a headers::Cookie>) -> Option<&'a str> {
        header.and_then(|cookies| cookies.get(&self.cookie_name))
    }

    /// Always succeeds. A missing, malformed, expired or forged cookie
    /// yields a fresh empty session: an invalid cookie is a new visitor,
    /// not an error.
    pub fn get_session(&self, cookie_value: Option<&str>) -> Session {
        match cookie_value.and_then(|value| self.codec.decode(value)) {
            Some(bag) => Session::from_bag(bag),
            None => Session::empty(),
        }
    }

    /// Re-encodes the session bag into a `Set-Cookie` value. Must be
    /// attached to every response where the session was mutated.
    pub fn commit_session(&self, session: &Session) -> Result<String, Error> {
        let value = self.codec.encode(&session.bag)?;
        Ok(format!(
            "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax{}",
            self.cookie_name,
            value,
            self.lifetime_secs,
            if self.secure { "; Secure" } else { "" },
        ))
    }

    /// A `Set-Cookie` value instructing the client to discard the cookie.
    pub fn destroy_session(&self) -> String {
        format!(
            "{}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax{}",
            self.cookie_name,
            if self.secure { "; Secure" } else { "" },
        )
    }

    /// Authorization gate for protected operations. Fails closed with a
    /// redirect-to-login error unless the session carries a teacher
    /// identity; callers may assume `teacherId` is present afterwards.
    pub fn require_teacher_session(&self, cookie_value: Option<&str>) -> Result<Session, Error> {
        let session = self.get_session(cookie_value);
        if !session.has(TEACHER_ID_KEY) {
            return Err(Error::unauthorized());
        }
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sessions() -> Sessions {
        Sessions::new(&SessionConfig::for_tests())
    }

    fn sample_bag() -> BTreeMap<String, String> {
        let mut bag = BTreeMap::new();
        bag.insert(
            TEACHER_ID_KEY.to_string(),
            "5f8b3a1e-9c2d-4e7f-8a6b-1d3c5e7f9a0b".to_string(),
        );
        bag.insert("courseId".to_string(), "some-course".to_string());
        bag
    }

    #[test]
    fn encode_decode_round_trip() {
        let codec = SessionCodec::new("round-trip-secret", 3600);
        let bag = sample_bag();
        let cookie = codec.encode(&bag).unwrap();
        assert_eq!(codec.decode(&cookie), Some(bag));
    }

    #[test]
    fn empty_bag_round_trips() {
        let codec = SessionCodec::new("round-trip-secret", 3600);
        let cookie = codec.encode(&BTreeMap::new()).unwrap();
        assert_eq!(codec.decode(&cookie), Some(BTreeMap::new()));
    }

    #[test]
    fn any_single_byte_flip_is_rejected() {
        let codec = SessionCodec::new("tamper-secret", 3600);
        let cookie = codec.encode(&sample_bag()).unwrap();
        for i in 0..cookie.len() {
            let mut bytes = cookie.clone().into_bytes();
            bytes[i] ^= 0x01;
            let tampered = String::from_utf8(bytes).unwrap();
            assert_eq!(codec.decode(&tampered), None, "byte {} flip accepted", i);
        }
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let codec = SessionCodec::new("secret-one-0123456789", 3600);
        let other = SessionCodec::new("secret-two-0123456789", 3600);
        let cookie = codec.encode(&sample_bag()).unwrap();
        assert_eq!(other.decode(&cookie), None);
    }

    #[test]
    fn expired_cookie_is_rejected() {
        // Negative lifetime puts the expiry in the past immediately.
        let codec = SessionCodec::new("expiry-secret", -10);
        let cookie = codec.encode(&sample_bag()).unwrap();
        assert_eq!(codec.decode(&cookie), None);
    }

    #[test]
    fn garbage_cookie_values_decode_to_none() {
        let codec = SessionCodec::new("garbage-secret", 3600);
        for garbage in ["", ".", "abc", "zz.zz", "deadbeef.", ".deadbeef", "deadbeef.cafe"] {
            assert_eq!(codec.decode(garbage), None, "{:?} accepted", garbage);
        }
    }

    #[test]
    fn invalid_cookie_yields_an_empty_session() {
        let sessions = sessions();
        let session = sessions.get_session(Some("definitely.not-a-session"));
        assert!(!session.has(TEACHER_ID_KEY));
        assert!(sessions.get_session(None).bag.is_empty());
    }

    #[test]
    fn login_style_mutate_commit_read_back() {
        let sessions = sessions();
        let mut session = sessions.get_session(None);
        session.set(TEACHER_ID_KEY, "5f8b3a1e-9c2d-4e7f-8a6b-1d3c5e7f9a0b");

        let set_cookie = sessions.commit_session(&session).unwrap();
        let value = set_cookie
            .strip_prefix("__session=")
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_string();

        let restored = sessions.get_session(Some(&value));
        assert_eq!(
            restored.teacher_id().unwrap().to_string(),
            "5f8b3a1e-9c2d-4e7f-8a6b-1d3c5e7f9a0b"
        );
    }

    #[test]
    fn committed_cookie_carries_the_required_attributes() {
        let sessions = sessions();
        let session = sessions.get_session(None);
        let set_cookie = sessions.commit_session(&session).unwrap();
        assert!(set_cookie.starts_with("__session="));
        assert!(set_cookie.contains("HttpOnly"));
        assert!(set_cookie.contains("SameSite=Lax"));
        assert!(set_cookie.contains("Max-Age=3600"));
        assert!(!set_cookie.contains("Secure"));
    }

    #[test]
    fn secure_config_adds_the_secure_attribute() {
        let mut config = SessionConfig::for_tests();
        config.secure = true;
        let sessions = Sessions::new(&config);
        let set_cookie = sessions.commit_session(&Session::empty()).unwrap();
        assert!(set_cookie.ends_with("; Secure"));
        assert!(sessions.destroy_session().ends_with("; Secure"));
    }

    #[test]
    fn destroyed_cookie_expires_immediately() {
        let destroy = sessions().destroy_session();
        assert!(destroy.starts_with("__session=;"));
        assert!(destroy.contains("Max-Age=0"));
        assert!(destroy.contains("HttpOnly"));
    }

    #[test]
    fn gate_rejects_missing_and_undecodable_cookies() {
        let sessions = sessions();
        assert!(matches!(
            sessions.require_teacher_session(None),
            Err(Error::Unauthorized { .. })
        ));
        assert!(matches!(
            sessions.require_teacher_session(Some("forged.cookie")),
            Err(Error::Unauthorized { .. })
        ));
    }

    #[test]
    fn gate_rejects_a_session_without_a_teacher() {
        let sessions = sessions();
        let anonymous = sessions.commit_session(&Session::empty()).unwrap();
        let value = anonymous
            .strip_prefix("__session=")
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_string();
        assert!(sessions.require_teacher_session(Some(&value)).is_err());
    }

    #[test]
    fn gate_admits_an_authenticated_session() {
        let sessions = sessions();
        let mut session = Session::empty();
        let id = Uuid::new_v4();
        session.set(TEACHER_ID_KEY, id.to_string());
        let committed = sessions.commit_session(&session).unwrap();
        let value = committed
            .strip_prefix("__session=")
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_string();

        let admitted = sessions.require_teacher_session(Some(&value)).unwrap();
        assert_eq!(admitted.teacher_id(), Some(id));
    }

    #[test]
    fn session_bag_operations() {
        let mut session = Session::empty();
        assert!(!session.has("courseId"));
        session.set("courseId", "abc");
        assert_eq!(session.get("courseId"), Some("abc"));
        assert!(session.has("courseId"));
        session.remove("courseId");
        assert!(!session.has("courseId"));
        assert_eq!(session.teacher_id(), None);
    }
}
