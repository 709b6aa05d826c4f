//! Live [`ImapOps`] over the `imap` crate with `native-tls`.

use std::collections::BTreeMap;
use std::net::TcpStream;

use chrono::{DateTime, FixedOffset};
use native_tls::{TlsConnector, TlsStream};
use tracing::{debug, info, warn};

use super::{convert, uid_set, FolderInfo, FolderName, ImapOps, Uid};
use crate::config::ServerConfig;
use crate::error::{RepairError, Result};
use crate::model::candidate::{Envelope, StructureFetch};

/// An authenticated IMAP session.
pub struct ImapSession {
    session: imap::Session<TlsStream<TcpStream>>,
    host: String,
}

impl ImapSession {
    /// Connect and log in.
    ///
    /// `ssl = true` uses implicit TLS, otherwise the connection is upgraded
    /// with STARTTLS; credentials are never sent in clear text.
    pub fn connect(server: &ServerConfig, password: &str) -> Result<Self> {
        server.validate()?;
        let port = server.effective_port();
        let tls = TlsConnector::builder()
            .build()
            .map_err(|e| RepairError::transport("tls setup", e))?;

        debug!(host = %server.host, port, ssl = server.ssl, "Connecting");
        let addr = (server.host.as_str(), port);
        let client = if server.ssl {
            imap::connect(addr, &server.host, &tls)
        } else {
            imap::connect_starttls(addr, &server.host, &tls)
        }
        .map_err(|e| RepairError::transport("connect", e))?;

        let session = client
            .login(&server.username, password)
            .map_err(|(e, _client)| RepairError::transport("login", e))?;
        info!(host = %server.host, user = %server.username, "Logged in");

        Ok(Self {
            session,
            host: server.host.clone(),
        })
    }

    /// Server host name this session is connected to.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn logout(mut self) -> Result<()> {
        self.session
            .logout()
            .map_err(|e| RepairError::transport("logout", e))
    }
}

impl ImapOps for ImapSession {
    fn select_folder(&mut self, name: &str, readonly: bool) -> Result<FolderInfo> {
        let mailbox = if readonly {
            self.session.examine(name)
        } else {
            self.session.select(name)
        }
        .map_err(|e| RepairError::transport("select", e))?;

        debug!(folder = name, readonly, exists = mailbox.exists, "Selected");
        Ok(FolderInfo {
            name: name.to_string(),
            exists: mailbox.exists,
            uid_validity: mailbox.uid_validity,
        })
    }

    fn list_folders(&mut self) -> Result<Vec<FolderName>> {
        let names = self
            .session
            .list(None, Some("*"))
            .map_err(|e| RepairError::transport("list", e))?;
        Ok(names
            .iter()
            .map(|n| FolderName {
                name: n.name().to_string(),
                delimiter: n.delimiter().map(str::to_string),
            })
            .collect())
    }

    fn search(&mut self, criteria: &str) -> Result<Vec<Uid>> {
        let found = self
            .session
            .uid_search(criteria)
            .map_err(|e| RepairError::transport("uid_search", e))?;
        let mut uids: Vec<Uid> = found.into_iter().collect();
        uids.sort_unstable();
        Ok(uids)
    }

    fn fetch_structures(&mut self, uids: &[Uid]) -> Result<BTreeMap<Uid, StructureFetch>> {
        let mut out = BTreeMap::new();
        if uids.is_empty() {
            return Ok(out);
        }

        let fetches = self
            .session
            .uid_fetch(uid_set(uids), "(UID BODYSTRUCTURE INTERNALDATE)")
            .map_err(|e| RepairError::transport("uid_fetch", e))?;

        for fetch in fetches.iter() {
            let Some(uid) = fetch.uid else {
                warn!(seq = fetch.message, "FETCH response without UID");
                continue;
            };
            let structure = fetch.bodystructure().ok_or_else(|| {
                RepairError::transport("uid_fetch", format!("no BODYSTRUCTURE for UID {uid}"))
            })?;
            out.insert(
                uid,
                StructureFetch {
                    structure: convert::body_structure(structure),
                    internal_date: fetch.internal_date(),
                    seq: Some(fetch.message),
                },
            );
        }

        if out.len() != uids.len() {
            warn!(requested = uids.len(), returned = out.len(), "Server skipped UIDs");
        }
        Ok(out)
    }

    fn fetch_envelope(&mut self, uid: Uid) -> Result<Envelope> {
        let fetches = self
            .session
            .uid_fetch(uid.to_string(), "(UID ENVELOPE)")
            .map_err(|e| RepairError::transport("uid_fetch", e))?;
        let fetch = fetches
            .iter()
            .find(|f| f.uid == Some(uid))
            .ok_or_else(|| RepairError::transport("uid_fetch", format!("no response for UID {uid}")))?;
        let envelope = fetch.envelope().ok_or_else(|| {
            RepairError::transport("uid_fetch", format!("no ENVELOPE for UID {uid}"))
        })?;
        Ok(convert::envelope(fetch.message, envelope))
    }

    fn fetch_message(&mut self, uid: Uid) -> Result<Vec<u8>> {
        let fetches = self
            .session
            .uid_fetch(uid.to_string(), "(UID RFC822)")
            .map_err(|e| RepairError::transport("uid_fetch", e))?;
        let body = fetches
            .iter()
            .find(|f| f.uid == Some(uid))
            .and_then(|f| f.body())
            .ok_or_else(|| RepairError::transport("uid_fetch", format!("no body for UID {uid}")))?;
        debug!(uid, bytes = body.len(), "Fetched message");
        Ok(body.to_vec())
    }

    fn append(
        &mut self,
        folder: &str,
        message: &[u8],
        internal_date: Option<DateTime<FixedOffset>>,
    ) -> Result<()> {
        self.session
            .append_with_flags_and_date(folder, message, &[], internal_date)
            .map_err(|e| RepairError::transport("append", e))
    }

    fn copy(&mut self, uid: Uid, folder: &str) -> Result<()> {
        self.session
            .uid_copy(uid.to_string(), folder)
            .map_err(|e| RepairError::transport("uid_copy", e))
    }

    fn add_flags(&mut self, uid: Uid, flag: &str) -> Result<()> {
        self.session
            .uid_store(uid.to_string(), format!("+FLAGS ({flag})"))
            .map(|_| ())
            .map_err(|e| RepairError::transport("uid_store", e))
    }

    fn expunge(&mut self) -> Result<usize> {
        let removed = self
            .session
            .expunge()
            .map_err(|e| RepairError::transport("expunge", e))?;
        info!(removed = removed.len(), "Expunged");
        Ok(removed.len())
    }
}
