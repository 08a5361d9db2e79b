//! Authentication tickets, principals, and the token-construction pipeline
//! (spec.md §3 "Authentication Ticket", §4.6 "Token construction").

use crate::cache::{self, DynCache};
use crate::crypto::{SigningCredentials, half_hash_claim, random_token_256};
use crate::hooks::{Decision, ProviderHooks};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Which issued token a claim is allowed to ride along on (spec.md §3
/// "destinations").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    IdToken,
    AccessToken,
}

impl TokenKind {
    fn as_str(self) -> &'static str {
        match self {
            TokenKind::IdToken => "id_token",
            TokenKind::AccessToken => "token",
        }
    }
}

/// A single claim: a (type, value) pair tagged with the set of token kinds
/// it may be copied into.
#[derive(Debug, Clone)]
pub struct Claim {
    pub claim_type: String,
    pub value: String,
    pub destinations: HashSet<TokenKind>,
}

impl Claim {
    pub fn new(claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            claim_type: claim_type.into(),
            value: value.into(),
            destinations: HashSet::new(),
        }
    }

    pub fn with_destination(mut self, kind: TokenKind) -> Self {
        self.destinations.insert(kind);
        self
    }

    pub fn for_both(self) -> Self {
        self.with_destination(TokenKind::IdToken)
            .with_destination(TokenKind::AccessToken)
    }
}

pub const NAME_IDENTIFIER: &str = "sub_nameid";
pub const CLAIM_SUB: &str = "sub";

/// The set of claims asserted about the signed-in subject.
#[derive(Debug, Clone, Default)]
pub struct Principal {
    pub claims: Vec<Claim>,
}

impl Principal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_claim(mut self, claim: Claim) -> Self {
        self.claims.push(claim);
        self
    }

    pub fn find(&self, claim_type: &str) -> Option<&str> {
        self.claims
            .iter()
            .find(|c| c.claim_type == claim_type)
            .map(|c| c.value.as_str())
    }

    /// `sub`, falling back to the name-identifier claim — spec.md §4.6
    /// "Require sub (fall back to name-identifier; if absent, fail)".
    pub fn subject(&self) -> Option<&str> {
        self.find(CLAIM_SUB).or_else(|| self.find(NAME_IDENTIFIER))
    }

    /// Produces a copy containing only claims destined for `kind`, plus the
    /// name-identifier/`sub` claims, which are always kept (spec.md §4.6,
    /// invariant 3).
    pub fn filtered_for(&self, kind: TokenKind) -> Principal {
        let claims = self
            .claims
            .iter()
            .filter(|c| {
                c.claim_type == NAME_IDENTIFIER
                    || c.claim_type == CLAIM_SUB
                    || c.destinations.contains(&kind)
            })
            .cloned()
            .collect();
        Principal { claims }
    }
}

/// String→string properties with dedicated slots (spec.md §3), plus a
/// passthrough bag for anything else a host wants to carry along.
#[derive(Debug, Clone, Default)]
pub struct Properties {
    pub issued_utc: Option<DateTime<Utc>>,
    pub expires_utc: Option<DateTime<Utc>>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub resource: Option<String>,
    pub scope: Option<String>,
    pub audiences: Option<String>,
    pub extra: std::collections::HashMap<String, String>,
}

impl Properties {
    /// Enforces the spec.md §3 invariant `issued_utc ≤ expires_utc`.
    pub fn is_valid(&self) -> bool {
        match (self.issued_utc, self.expires_utc) {
            (Some(i), Some(e)) => i <= e,
            _ => true,
        }
    }

    pub fn scopes(&self) -> Vec<&str> {
        self.scope
            .as_deref()
            .map(|s| s.split_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn resources(&self) -> Vec<&str> {
        self.resource
            .as_deref()
            .map(|s| s.split_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn audiences(&self) -> Vec<&str> {
        self.audiences
            .as_deref()
            .map(|s| s.split_whitespace().collect())
            .unwrap_or_default()
    }

    /// Returns a copy with `issued_utc`/`expires_utc` cleared — used when
    /// handing properties to a token kind whose lifetime must not be aligned
    /// with the caller's (spec.md §4.4.1: authorization codes; §4.5 step 7:
    /// refreshed tokens before the new lifetime is computed).
    pub fn without_lifetime(&self) -> Properties {
        Properties {
            issued_utc: None,
            expires_utc: None,
            ..self.clone()
        }
    }

    /// Returns a copy stamped with a fresh `issued_utc = now` /
    /// `expires_utc = now + lifetime_secs` pair, decoupled from whatever
    /// lifetime the caller's own properties carried (spec.md §4.4.1).
    pub fn with_expiry(&self, lifetime_secs: i64) -> Properties {
        let now = Utc::now();
        Properties {
            issued_utc: Some(now),
            expires_utc: Some(now + chrono::Duration::seconds(lifetime_secs)),
            ..self.clone()
        }
    }
}

/// A (Principal, Properties, Scheme) triple (spec.md §3).
#[derive(Debug, Clone)]
pub struct AuthenticationTicket {
    pub principal: Principal,
    pub properties: Properties,
    pub scheme: String,
}

impl AuthenticationTicket {
    pub fn new(principal: Principal, properties: Properties, scheme: impl Into<String>) -> Self {
        Self {
            principal,
            properties,
            scheme: scheme.into(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.properties.expires_utc {
            Some(exp) => exp <= now,
            None => false,
        }
    }
}

/// Default implementation of opaque code/refresh-token persistence and
/// JWT-formatted access/identity token issuance (spec.md §4.6).
pub struct TicketStore {
    cache: DynCache,
    signing: SigningCredentials,
    issuer: String,
}

/// Serializes an `AuthenticationTicket` to bytes for opaque cache storage.
/// Claims are not filtered for opaque tickets (spec.md §4.6): the full
/// principal and properties round-trip unchanged.
fn serialize_ticket(ticket: &AuthenticationTicket) -> Vec<u8> {
    let mut params: Vec<(String, String)> = Vec::new();
    for claim in &ticket.principal.claims {
        let dest = claim
            .destinations
            .iter()
            .map(|d| d.as_str())
            .collect::<Vec<_>>()
            .join(",");
        params.push((format!("claim:{}", claim.claim_type), claim.value.clone()));
        params.push((format!("claim_dest:{}", claim.claim_type), dest));
    }
    if let Some(v) = ticket.properties.issued_utc {
        params.push(("issued_utc".into(), v.to_rfc3339()));
    }
    if let Some(v) = ticket.properties.expires_utc {
        params.push(("expires_utc".into(), v.to_rfc3339()));
    }
    if let Some(v) = &ticket.properties.client_id {
        params.push(("client_id".into(), v.clone()));
    }
    if let Some(v) = &ticket.properties.redirect_uri {
        params.push(("redirect_uri".into(), v.clone()));
    }
    if let Some(v) = &ticket.properties.resource {
        params.push(("resource".into(), v.clone()));
    }
    if let Some(v) = &ticket.properties.scope {
        params.push(("scope".into(), v.clone()));
    }
    if let Some(v) = &ticket.properties.audiences {
        params.push(("audiences".into(), v.clone()));
    }
    for (k, v) in &ticket.properties.extra {
        params.push((format!("extra:{}", k), v.clone()));
    }
    params.push(("scheme".into(), ticket.scheme.clone()));
    cache::blob::encode(&params)
}

fn deserialize_ticket(data: &[u8]) -> Option<AuthenticationTicket> {
    let params = cache::blob::decode(data)?;
    let mut properties = Properties::default();
    let mut scheme = String::new();
    let mut claim_values: std::collections::HashMap<String, String> = Default::default();
    let mut claim_dests: std::collections::HashMap<String, String> = Default::default();

    for (k, v) in params {
        if let Some(ty) = k.strip_prefix("claim:") {
            claim_values.insert(ty.to_string(), v);
        } else if let Some(ty) = k.strip_prefix("claim_dest:") {
            claim_dests.insert(ty.to_string(), v);
        } else if let Some(name) = k.strip_prefix("extra:") {
            properties.extra.insert(name.to_string(), v);
        } else {
            match k.as_str() {
                "issued_utc" => properties.issued_utc = DateTime::parse_from_rfc3339(&v).ok().map(|d| d.with_timezone(&Utc)),
                "expires_utc" => properties.expires_utc = DateTime::parse_from_rfc3339(&v).ok().map(|d| d.with_timezone(&Utc)),
                "client_id" => properties.client_id = Some(v),
                "redirect_uri" => properties.redirect_uri = Some(v),
                "resource" => properties.resource = Some(v),
                "scope" => properties.scope = Some(v),
                "audiences" => properties.audiences = Some(v),
                "scheme" => scheme = v,
                _ => {}
            }
        }
    }

    let mut claims = Vec::new();
    for (ty, value) in claim_values {
        let mut destinations = HashSet::new();
        if let Some(dest) = claim_dests.get(&ty) {
            for tag in dest.split(',').filter(|t| !t.is_empty()) {
                match tag {
                    "id_token" => {
                        destinations.insert(TokenKind::IdToken);
                    }
                    "token" => {
                        destinations.insert(TokenKind::AccessToken);
                    }
                    _ => {}
                }
            }
        }
        claims.push(Claim {
            claim_type: ty,
            value,
            destinations,
        });
    }

    Some(AuthenticationTicket {
        principal: Principal { claims },
        properties,
        scheme,
    })
}

impl TicketStore {
    pub fn new(cache: DynCache, signing: SigningCredentials, issuer: impl Into<String>) -> Self {
        Self {
            cache,
            signing,
            issuer: issuer.into(),
        }
    }

    /// Stores an opaque, single-use authorization code (spec.md §4.6). The
    /// code's own `issued_utc`/`expires_utc` are (re)stamped with `lifetime`,
    /// independent of whatever lifetime the caller's properties carried.
    pub async fn create_authorization_code(
        &self,
        ticket: &AuthenticationTicket,
        lifetime: Duration,
    ) -> anyhow::Result<String> {
        self.create_opaque(ticket, lifetime).await
    }

    /// Stores an opaque, long-lived refresh token (spec.md §4.6).
    pub async fn create_refresh_token(
        &self,
        ticket: &AuthenticationTicket,
        lifetime: Duration,
    ) -> anyhow::Result<String> {
        self.create_opaque(ticket, lifetime).await
    }

    async fn create_opaque(
        &self,
        ticket: &AuthenticationTicket,
        lifetime: Duration,
    ) -> anyhow::Result<String> {
        let mut ticket = ticket.clone();
        let now = Utc::now();
        ticket.properties.issued_utc = Some(now);
        ticket.properties.expires_utc =
            Some(now + chrono::Duration::from_std(lifetime).unwrap_or(chrono::Duration::zero()));
        let key = random_token_256();
        self.cache
            .set(&key, serialize_ticket(&ticket), lifetime)
            .await?;
        Ok(key)
    }

    /// Retrieves and deletes an authorization code — exactly-once redemption
    /// (spec.md §5 "Idempotence", §8 invariant 1).
    pub async fn receive_authorization_code(
        &self,
        code: &str,
    ) -> anyhow::Result<Option<AuthenticationTicket>> {
        self.receive_opaque(code).await
    }

    pub async fn receive_refresh_token(
        &self,
        token: &str,
    ) -> anyhow::Result<Option<AuthenticationTicket>> {
        self.receive_opaque(token).await
    }

    async fn receive_opaque(&self, key: &str) -> anyhow::Result<Option<AuthenticationTicket>> {
        let Some(data) = self.cache.get(key).await? else {
            return Ok(None);
        };
        self.cache.remove(key).await?;
        Ok(deserialize_ticket(&data))
    }

    /// Issues a signed access token JWT (spec.md §4.6). Claims are filtered
    /// to those destined for `token`, always keeping name-identifier/`sub`.
    pub fn create_access_token(
        &self,
        ticket: &AuthenticationTicket,
        request_resources: &[&str],
    ) -> anyhow::Result<String> {
        let filtered = ticket.principal.filtered_for(TokenKind::AccessToken);
        let mut sub = filtered.subject().map(str::to_string);
        if sub.is_none()
            && let Some(nameid) = filtered.find(NAME_IDENTIFIER)
        {
            sub = Some(nameid.to_string());
        }
        let sub = sub.ok_or_else(|| anyhow::anyhow!("a unique identifier cannot be found"))?;

        let audiences = if !request_resources.is_empty() {
            request_resources.iter().map(|s| s.to_string()).collect()
        } else {
            ticket.properties.resources().iter().map(|s| s.to_string()).collect::<Vec<_>>()
        };

        let claims = self.build_claims(&filtered, &ticket.properties, &sub, audiences);
        self.signing.sign(&claims)
    }

    /// Issues a signed identity token JWT, adding `c_hash`/`at_hash`/`nonce`
    /// extras per spec.md §4.6.
    pub fn create_identity_token(
        &self,
        ticket: &AuthenticationTicket,
        client_id: &str,
        nonce: Option<&str>,
        code: Option<&str>,
        access_token: Option<&str>,
    ) -> anyhow::Result<String> {
        let filtered = ticket.principal.filtered_for(TokenKind::IdToken);
        let sub = filtered
            .subject()
            .ok_or_else(|| anyhow::anyhow!("a unique identifier cannot be found"))?
            .to_string();

        let mut claims = self.build_claims(&filtered, &ticket.properties, &sub, vec![client_id.to_string()]);
        let obj = claims.as_object_mut().expect("claims is always an object");

        let iat = Utc::now().timestamp();
        obj.insert("iat".into(), serde_json::Value::from(iat));
        if let Some(code) = code {
            obj.insert("c_hash".into(), serde_json::Value::String(half_hash_claim(code)));
        }
        if let Some(at) = access_token {
            obj.insert("at_hash".into(), serde_json::Value::String(half_hash_claim(at)));
        }
        if let Some(nonce) = nonce {
            obj.insert("nonce".into(), serde_json::Value::String(nonce.to_string()));
        }

        self.signing.sign(&claims)
    }

    fn build_claims(
        &self,
        principal: &Principal,
        properties: &Properties,
        sub: &str,
        audiences: Vec<String>,
    ) -> serde_json::Value {
        let now = Utc::now();
        let exp = properties.expires_utc.unwrap_or(now + chrono::Duration::hours(1));
        let mut obj = serde_json::Map::new();
        obj.insert("iss".into(), serde_json::Value::String(self.issuer.clone()));
        obj.insert(
            "aud".into(),
            if audiences.len() == 1 {
                serde_json::Value::String(audiences.into_iter().next().unwrap())
            } else {
                serde_json::Value::Array(audiences.into_iter().map(serde_json::Value::String).collect())
            },
        );
        obj.insert("iat".into(), serde_json::Value::from(now.timestamp()));
        obj.insert("exp".into(), serde_json::Value::from(exp.timestamp()));
        obj.insert("sub".into(), serde_json::Value::String(sub.to_string()));
        for claim in &principal.claims {
            if claim.claim_type == CLAIM_SUB || claim.claim_type == NAME_IDENTIFIER {
                continue;
            }
            obj.insert(claim.claim_type.clone(), serde_json::Value::String(claim.value.clone()));
        }
        serde_json::Value::Object(obj)
    }
}

/// Wraps a [`TicketStore`] with the host's [`ProviderHooks`], giving every
/// create/receive operation a chance to be observed or replaced before
/// falling back to the store's own default behavior (spec.md §6: the
/// `Create*`/`Receive*` hooks).
pub struct TicketService {
    pub store: TicketStore,
    pub hooks: Arc<dyn ProviderHooks>,
}

impl TicketService {
    pub fn new(store: TicketStore, hooks: Arc<dyn ProviderHooks>) -> Self {
        Self { store, hooks }
    }

    pub async fn create_authorization_code(
        &self,
        ticket: &AuthenticationTicket,
        lifetime: Duration,
    ) -> anyhow::Result<Option<String>> {
        match self.hooks.create_authorization_code(ticket).await {
            Decision::Handled(code) => Ok(Some(code)),
            Decision::Rejected(_) => Ok(None),
            _ => Ok(Some(
                self.store.create_authorization_code(ticket, lifetime).await?,
            )),
        }
    }

    pub async fn create_refresh_token(
        &self,
        ticket: &AuthenticationTicket,
        lifetime: Duration,
    ) -> anyhow::Result<Option<String>> {
        match self.hooks.create_refresh_token(ticket).await {
            Decision::Handled(token) => Ok(Some(token)),
            Decision::Rejected(_) => Ok(None),
            _ => Ok(Some(
                self.store.create_refresh_token(ticket, lifetime).await?,
            )),
        }
    }

    pub async fn create_access_token(
        &self,
        ticket: &AuthenticationTicket,
        request_resources: &[&str],
    ) -> anyhow::Result<Option<String>> {
        match self.hooks.create_access_token(ticket).await {
            Decision::Handled(token) => Ok(Some(token)),
            Decision::Rejected(_) => Ok(None),
            _ => Ok(Some(
                self.store.create_access_token(ticket, request_resources)?,
            )),
        }
    }

    pub async fn create_identity_token(
        &self,
        ticket: &AuthenticationTicket,
        client_id: &str,
        nonce: Option<&str>,
        code: Option<&str>,
        access_token: Option<&str>,
    ) -> anyhow::Result<Option<String>> {
        match self.hooks.create_identity_token(ticket).await {
            Decision::Handled(token) => Ok(Some(token)),
            Decision::Rejected(_) => Ok(None),
            _ => Ok(Some(self.store.create_identity_token(
                ticket,
                client_id,
                nonce,
                code,
                access_token,
            )?)),
        }
    }

    pub async fn receive_authorization_code(
        &self,
        code: &str,
    ) -> anyhow::Result<Option<AuthenticationTicket>> {
        match self.hooks.receive_authorization_code(code).await {
            Decision::Handled(ticket) => Ok(Some(ticket)),
            Decision::Rejected(_) => Ok(None),
            _ => self.store.receive_authorization_code(code).await,
        }
    }

    pub async fn receive_refresh_token(
        &self,
        token: &str,
    ) -> anyhow::Result<Option<AuthenticationTicket>> {
        match self.hooks.receive_refresh_token(token).await {
            Decision::Handled(ticket) => Ok(Some(ticket)),
            Decision::Rejected(_) => Ok(None),
            _ => self.store.receive_refresh_token(token).await,
        }
    }
}
