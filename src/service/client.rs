// src/service/client.rs

//! HTTP client for the Canvas service
//!
//! Wraps a blocking reqwest client with a cookie store. Login posts the
//! credentials to `/authenticate.json` and the session cookie carries the
//! rest of the session. Lookups are tried anonymously first and retried once
//! after logging in, so public templates never prompt for a password.
//!
//! Machine syncs are not cookie-authenticated; they are signed with the key
//! handed out when the machine was registered.

use hmac::{Hmac, Mac};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde_json::{json, Value};
use sha2::Sha512;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use super::{ListFilter, MachineStore, Summary, TemplateStore};
use crate::error::{Error, Result};

/// Default timeout for HTTP requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const UNKNOWN_RESPONSE: &str = "unknown service response";

/// Supplies the password for `user` when the service asks for a login
pub type PasswordPrompt = Box<dyn FnMut(&str) -> Result<String>>;

pub struct ServiceClient {
    client: Client,
    base: String,
    user: String,
    prompt: PasswordPrompt,
    authenticated: bool,
}

impl ServiceClient {
    /// Create a client for `host`, logging in as `user` when needed
    pub fn new(host: &str, user: &str, prompt: PasswordPrompt) -> Result<Self> {
        let parsed = Url::parse(host)
            .map_err(|e| Error::Config(format!("invalid service host '{}': {}", host, e)))?;

        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .cookie_store(true)
            .build()
            .map_err(|e| Error::service(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base: parsed.as_str().trim_end_matches('/').to_string(),
            user: user.to_string(),
            prompt,
            authenticated: false,
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path)
    }

    /// Log in once per session
    pub fn authenticate(&mut self) -> Result<()> {
        if self.authenticated {
            return Ok(());
        }

        let password = (self.prompt)(&self.user)?;
        info!("Authenticating to {} as {}", self.base, self.user);

        let response = self
            .client
            .post(self.url("authenticate.json"))
            .json(&json!({"u": self.user, "p": password}))
            .send()
            .map_err(|e| Error::service(format!("unable to reach service: {e}")))?;

        if !response.status().is_success() {
            debug!("Authentication returned HTTP {}", response.status());
            return Err(Error::Authentication("unable to authenticate".to_string()));
        }

        self.authenticated = true;
        Ok(())
    }

    /// End the session
    pub fn deauthenticate(&mut self) -> Result<()> {
        if !self.authenticated {
            return Ok(());
        }
        send(self.client.get(self.url("deauthenticate.json")))?;
        self.authenticated = false;
        Ok(())
    }

    fn list(&self, collection: &str, query: &[(&str, String)]) -> Result<Vec<Summary>> {
        let value = send(self.client.get(self.url(collection)).query(query))?;
        serde_json::from_value(value).map_err(|_| Error::service(UNKNOWN_RESPONSE))
    }

    /// Find `user:name` in a collection, logging in and retrying once when
    /// nothing is visible anonymously
    fn lookup(&mut self, collection: &str, user: &str, name: &str) -> Result<String> {
        let query = [("user", user.to_string()), ("name", name.to_string())];

        let mut summaries = self.list(collection, &query)?;
        if summaries.is_empty() && !self.authenticated {
            self.authenticate()?;
            summaries = self.list(collection, &query)?;
        }

        summaries
            .first()
            .and_then(Summary::uuid)
            .map(str::to_string)
            .ok_or_else(|| Error::NotFound(format!("unable to find {}:{}", user, name)))
    }
}

/// Send a request and decode the JSON body or the service error it carries
fn send(request: RequestBuilder) -> Result<Value> {
    let response = request
        .send()
        .map_err(|e| Error::service(format!("unable to reach service: {e}")))?;
    decode(response)
}

fn decode(response: Response) -> Result<Value> {
    let status = response.status();
    let body = response
        .text()
        .map_err(|e| Error::service(format!("failed to read response: {e}")))?;
    debug!("HTTP {} ({} bytes)", status, body.len());

    parse_body(status.is_success(), &body)
}

fn parse_body(success: bool, body: &str) -> Result<Value> {
    if success {
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        return serde_json::from_str(body).map_err(|_| Error::service(UNKNOWN_RESPONSE));
    }

    let reason = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string));

    match reason {
        Some(reason) => Err(Error::service(reason)),
        None => Err(Error::service(UNKNOWN_RESPONSE)),
    }
}

/// hex(HMAC-SHA512(hex-decoded key, nonce ‖ uuid))
pub fn sign(key: &str, nonce: &str, uuid: &str) -> Result<String> {
    let key = hex::decode(key)
        .map_err(|e| Error::Authentication(format!("invalid machine key: {e}")))?;
    let mut mac = Hmac::<Sha512>::new_from_slice(&key)
        .map_err(|e| Error::Authentication(format!("invalid machine key: {e}")))?;
    mac.update(nonce.as_bytes());
    mac.update(uuid.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

impl TemplateStore for ServiceClient {
    fn get_template(&mut self, user: &str, name: &str) -> Result<Value> {
        let uuid = self.lookup("api/templates.json", user, name)?;
        send(self.client.get(self.url(&format!("api/template/{}.json", uuid))))
    }

    fn create_template(&mut self, payload: &Value) -> Result<Value> {
        self.authenticate()?;
        send(self.client.post(self.url("api/templates.json")).json(payload))
    }

    fn update_template(&mut self, uuid: &str, payload: &Value) -> Result<Value> {
        self.authenticate()?;
        send(
            self.client
                .put(self.url(&format!("api/template/{}.json", uuid)))
                .json(payload),
        )
    }

    fn delete_template(&mut self, uuid: &str) -> Result<Value> {
        self.authenticate()?;
        send(
            self.client
                .delete(self.url(&format!("api/template/{}.json", uuid))),
        )
    }

    fn list_templates(&mut self, filter: &ListFilter) -> Result<Vec<Summary>> {
        let rows = self.list("api/templates.json", &filter.query_pairs())?;
        Ok(rows.into_iter().filter(|row| filter.admits(row)).collect())
    }
}

impl MachineStore for ServiceClient {
    fn get_machine(&mut self, user: &str, name: &str) -> Result<Value> {
        let uuid = self.lookup("api/machines.json", user, name)?;
        send(self.client.get(self.url(&format!("api/machine/{}.json", uuid))))
    }

    fn create_machine(&mut self, payload: &Value) -> Result<Value> {
        self.authenticate()?;
        send(self.client.post(self.url("api/machines.json")).json(payload))
    }

    fn update_machine(&mut self, uuid: &str, payload: &Value) -> Result<Value> {
        self.authenticate()?;
        send(
            self.client
                .put(self.url(&format!("api/machine/{}.json", uuid)))
                .json(payload),
        )
    }

    fn delete_machine(&mut self, uuid: &str) -> Result<Value> {
        self.authenticate()?;
        send(
            self.client
                .delete(self.url(&format!("api/machine/{}.json", uuid))),
        )
    }

    fn list_machines(&mut self, filter: &ListFilter) -> Result<Vec<Summary>> {
        self.authenticate()?;
        self.list("api/machines.json", &filter.query_pairs())
    }

    fn sync_machine(&mut self, uuid: &str, key: &str) -> Result<Value> {
        let nonce = Uuid::new_v4().to_string();
        let hash = sign(key, &nonce, uuid)?;

        send(
            self.client
                .get(self.url(&format!("api/machine/{}/sync.json", uuid)))
                .query(&[("template", "true")])
                .header("x-canvas-nonce", nonce)
                .header("x-canvas-uuid", uuid)
                .header("x-canvas-hash", hash),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    fn no_password() -> PasswordPrompt {
        Box::new(|_| Err(Error::Authentication("no password".to_string())))
    }

    /// Answer one request with `body` and hand back the raw request
    fn serve_once(body: &'static str) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let host = format!("http://{}", listener.local_addr().unwrap());

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = [0u8; 4096];
            let n = stream.read(&mut request).unwrap();
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\
                 Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).unwrap();
            String::from_utf8_lossy(&request[..n]).to_string()
        });

        (host, server)
    }

    #[test]
    fn test_list_templates_public_only() {
        let (host, server) = serve_once(
            r#"[
                {"uuid": "t-1", "username": "firnsy", "stub": "desktop", "meta": {"public": true}},
                {"uuid": "t-2", "username": "firnsy", "stub": "scratch", "meta": {"public": false}},
                {"uuid": "t-3", "user": "kriss", "stub": "server"}
            ]"#,
        );
        let mut client = ServiceClient::new(&host, "firnsy", no_password()).unwrap();
        let filter = ListFilter {
            public_only: true,
            ..ListFilter::default()
        };

        let rows = client.list_templates(&filter).unwrap();
        let request = server.join().unwrap();

        assert!(request.starts_with("GET /api/templates.json?public=1 "));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].reference(), "firnsy:desktop");
    }

    #[test]
    fn test_sign_matches_reference_digest() {
        let hash = sign("00112233445566778899aabbccddeeff", "nonce-1", "m-1").unwrap();
        assert_eq!(
            hash,
            "582a4f451c67897031dbf4fd88996f6cea5947c1a6b9148aa712322413f12fe7\
             62026b1893661f964fd98c236344d6cc9bdb805c2e5ab4eca5c6d34bbcfe6421"
        );
    }

    #[test]
    fn test_sign_rejects_non_hex_key() {
        assert!(matches!(
            sign("not-hex", "n", "u"),
            Err(Error::Authentication(_))
        ));
    }

    #[test]
    fn test_error_body_is_lowercased() {
        let err = parse_body(false, r#"{"error": "Template Not Found"}"#).unwrap_err();
        assert_eq!(err.to_string(), "error: template not found");

        let err = parse_body(false, "<html>502</html>").unwrap_err();
        assert_eq!(err.to_string(), "error: unknown service response");
    }

    #[test]
    fn test_success_body() {
        assert_eq!(parse_body(true, "").unwrap(), Value::Null);
        assert_eq!(parse_body(true, r#"{"uuid":"x"}"#).unwrap()["uuid"], "x");
        assert!(parse_body(true, "not json").is_err());
    }

    #[test]
    fn test_new_rejects_bad_host() {
        assert!(matches!(
            ServiceClient::new("not a url", "firnsy", no_password()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_url_join() {
        let client =
            ServiceClient::new("https://canvas.example.org/", "firnsy", no_password()).unwrap();
        assert_eq!(
            client.url("api/templates.json"),
            "https://canvas.example.org/api/templates.json"
        );
        assert!(!client.is_authenticated());
    }
}
