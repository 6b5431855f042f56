//! In-process mock of the Tor control port
//!
//! Speaks enough of the protocol for the session and publication tests:
//! PROTOCOLINFO, AUTHCHALLENGE, AUTHENTICATE, ADD_ONION, DEL_ONION and
//! GETINFO. Every received line is recorded, and `<closed>` is recorded
//! when a client hangs up.

#![allow(dead_code)]

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tavern::config::ControllerConfig;
use tavern::crypto::{KeyType, OnionIdentity};
use tavern::tor::auth;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

const SERVER_NONCE: [u8; 32] = [7u8; 32];

/// How the mock daemon behaves
#[derive(Debug, Clone, Default)]
pub struct MockOptions {
    /// Accepted control password
    pub password: Option<String>,
    /// Methods advertised in PROTOCOLINFO
    pub methods: Vec<&'static str>,
    /// Cookie file advertised in PROTOCOLINFO and its contents
    pub cookie: Option<(PathBuf, Vec<u8>)>,
    /// Command keyword that never gets a reply
    pub hang_on: Option<&'static str>,
    /// Raw reply sent to ADD_ONION instead of the computed one
    pub add_onion_reply: Option<String>,
    /// Prefix every reply with an asynchronous event line
    pub async_events: bool,
    /// Answer AUTHCHALLENGE with a server hash computed from the wrong cookie
    pub forged_server_hash: bool,
    /// Reject AUTHCHALLENGE but keep the connection open
    pub refuse_challenge: bool,
}

impl MockOptions {
    pub fn null_auth() -> Self {
        Self {
            methods: vec!["NULL"],
            ..Self::default()
        }
    }

    pub fn password(password: &str) -> Self {
        Self {
            password: Some(password.to_string()),
            methods: vec!["HASHEDPASSWORD"],
            ..Self::default()
        }
    }

    pub fn cookie(path: PathBuf, cookie: Vec<u8>, methods: Vec<&'static str>) -> Self {
        Self {
            methods,
            cookie: Some((path, cookie)),
            ..Self::default()
        }
    }
}

#[derive(Default)]
struct Shared {
    log: Vec<String>,
    services: HashSet<String>,
}

/// Running mock daemon
pub struct MockDaemon {
    pub addr: SocketAddr,
    shared: Arc<Mutex<Shared>>,
}

impl MockDaemon {
    pub async fn start(options: MockOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shared = Arc::new(Mutex::new(Shared::default()));
        let options = Arc::new(options);

        let accept_shared = Arc::clone(&shared);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(handle_client(
                    stream,
                    Arc::clone(&options),
                    Arc::clone(&accept_shared),
                ));
            }
        });

        Self { addr, shared }
    }

    /// Controller config pointing at this daemon
    pub fn controller(&self, password: Option<&str>, timeout_secs: Option<u64>) -> ControllerConfig {
        ControllerConfig {
            host: "127.0.0.1".to_string(),
            port: self.addr.port(),
            password: password.map(str::to_string),
            timeout_secs,
        }
    }

    /// Every line received so far
    pub fn commands(&self) -> Vec<String> {
        self.shared.lock().unwrap().log.clone()
    }

    /// Number of received lines starting with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.commands()
            .iter()
            .filter(|line| line.starts_with(prefix))
            .count()
    }

    /// Wait until a line starting with `prefix` was recorded
    pub async fn wait_for(&self, prefix: &str) -> bool {
        for _ in 0..100 {
            if self.count(prefix) > 0 {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }
}

struct Client {
    authenticated: bool,
    expected_safecookie: Option<Vec<u8>>,
}

async fn handle_client(stream: TcpStream, options: Arc<MockOptions>, shared: Arc<Mutex<Shared>>) {
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut client = Client {
        authenticated: false,
        expected_safecookie: None,
    };

    loop {
        let mut line = String::new();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {},
        }
        let line = line.trim_end_matches(['\r', '\n']).to_string();
        shared.lock().unwrap().log.push(line.clone());

        if let Some(head) = line.strip_prefix('+') {
            // multi-line command: swallow the body up to the lone "."
            let mut body = Vec::new();
            loop {
                let mut data = String::new();
                if reader.read_line(&mut data).await.unwrap_or(0) == 0 {
                    break;
                }
                let data = data.trim_end_matches(['\r', '\n']).to_string();
                if data == "." {
                    break;
                }
                body.push(data);
            }
            shared
                .lock()
                .unwrap()
                .log
                .push(format!("<body {}>{}", head, body.join("\n")));
            if writer.write_all(b"250 OK\r\n").await.is_err() {
                break;
            }
            continue;
        }

        let (keyword, rest) = line.split_once(' ').unwrap_or((line.as_str(), ""));
        if options.hang_on == Some(keyword) {
            continue;
        }

        let (reply, close) = respond(keyword, rest, &options, &shared, &mut client);
        let mut out = String::new();
        if options.async_events {
            out.push_str("650 STATUS_GENERAL NOTICE CLOCK_JUMPED TIME=1\r\n");
        }
        out.push_str(&reply);
        if writer.write_all(out.as_bytes()).await.is_err() {
            break;
        }
        if close {
            break;
        }
    }

    shared.lock().unwrap().log.push("<closed>".to_string());
}

fn respond(
    keyword: &str,
    rest: &str,
    options: &MockOptions,
    shared: &Mutex<Shared>,
    client: &mut Client,
) -> (String, bool) {
    match keyword {
        "PROTOCOLINFO" => {
            let mut auth_line = format!("250-AUTH METHODS={}", options.methods.join(","));
            if let Some((path, _)) = &options.cookie {
                auth_line.push_str(&format!(" COOKIEFILE=\"{}\"", path.display()));
            }
            (
                format!(
                    "250-PROTOCOLINFO 1\r\n{}\r\n250-VERSION Tor=\"0.4.8.9\"\r\n250 OK\r\n",
                    auth_line
                ),
                false,
            )
        },
        "AUTHCHALLENGE" => {
            if options.refuse_challenge {
                return ("513 SAFECOOKIE authentication is disabled\r\n".to_string(), false);
            }
            let Some((_, cookie)) = &options.cookie else {
                return ("513 Cookie authentication is disabled\r\n".to_string(), true);
            };
            let Some(nonce_hex) = rest.strip_prefix("SAFECOOKIE ") else {
                return ("513 Invalid argument\r\n".to_string(), true);
            };
            let client_nonce = hex::decode(nonce_hex.trim()).unwrap();
            let server_hash = if options.forged_server_hash {
                auth::server_hash(&[0u8; 32], &client_nonce, &SERVER_NONCE)
            } else {
                auth::server_hash(cookie, &client_nonce, &SERVER_NONCE)
            };
            client.expected_safecookie =
                Some(auth::client_hash(cookie, &client_nonce, &SERVER_NONCE));
            (
                format!(
                    "250 AUTHCHALLENGE SERVERHASH={} SERVERNONCE={}\r\n",
                    hex::encode_upper(server_hash),
                    hex::encode_upper(SERVER_NONCE)
                ),
                false,
            )
        },
        "AUTHENTICATE" => {
            let presented = rest.trim();
            let accepted = if let Some(password) = &options.password {
                presented == hex::encode(password.as_bytes())
            } else if let Some(expected) = client.expected_safecookie.take() {
                presented == hex::encode(expected)
            } else if presented.is_empty() {
                options.methods.contains(&"NULL")
            } else if let (true, Some((_, cookie))) =
                (options.methods.contains(&"COOKIE"), &options.cookie)
            {
                presented == hex::encode(cookie)
            } else {
                false
            };

            if accepted {
                client.authenticated = true;
                ("250 OK\r\n".to_string(), false)
            } else {
                (
                    "515 Authentication failed: Password did not match\r\n".to_string(),
                    true,
                )
            }
        },
        _ if !client.authenticated => ("514 Authentication required.\r\n".to_string(), true),
        "ADD_ONION" => {
            if let Some(reply) = &options.add_onion_reply {
                return (reply.clone(), false);
            }
            let key = rest.split(' ').next().unwrap_or("");
            let (identity, echo_key) = match key.strip_prefix("NEW:") {
                Some(tag) => {
                    let key_type = KeyType::from_tag(tag).unwrap_or(KeyType::Ed25519V3);
                    (OnionIdentity::generate(key_type).unwrap(), true)
                },
                None => match OnionIdentity::from_key_blob(key) {
                    Ok(identity) => (identity, false),
                    Err(_) => {
                        return ("513 Invalid key blob\r\n".to_string(), false);
                    },
                },
            };

            let id = identity.service_id().to_string();
            if !shared.lock().unwrap().services.insert(id.clone()) {
                return ("550 Onion address collision\r\n".to_string(), false);
            }

            let mut reply = format!("250-ServiceID={}\r\n", id);
            if echo_key {
                reply.push_str(&format!("250-PrivateKey={}\r\n", identity.key_blob()));
            }
            reply.push_str("250 OK\r\n");
            (reply, false)
        },
        "DEL_ONION" => {
            if shared.lock().unwrap().services.remove(rest.trim()) {
                ("250 OK\r\n".to_string(), false)
            } else {
                ("552 Unknown Onion Service id\r\n".to_string(), false)
            }
        },
        "GETINFO" => (format!("250-{}=0.4.8.9\r\n250 OK\r\n", rest.trim()), false),
        other => (format!("510 Unrecognized command \"{}\"\r\n", other), false),
    }
}
