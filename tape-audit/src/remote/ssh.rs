//! SSH transport for remote commands.
//!
//! One session is opened per server and reused for every command issued to
//! it during the run. Authentication is key-based: an explicit private key
//! when configured, otherwise the running SSH agent.

use super::RemoteExec;
use crate::config::SshConfig;
use crate::utils::{AuditError, Result};
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Read;
use std::net::TcpStream;

pub struct SshExecutor {
    config: SshConfig,
    sessions: RefCell<HashMap<String, ssh2::Session>>,
}

impl SshExecutor {
    pub fn new(config: SshConfig) -> Self {
        Self {
            config,
            sessions: RefCell::new(HashMap::new()),
        }
    }

    fn connect(&self, server: &str) -> std::result::Result<ssh2::Session, String> {
        let tcp = TcpStream::connect((server, self.config.port))
            .map_err(|e| format!("TCP connect failed: {e}"))?;
        let mut sess = ssh2::Session::new().map_err(|e| e.to_string())?;
        sess.set_tcp_stream(tcp);
        sess.set_timeout(self.config.timeout_ms);
        sess.handshake()
            .map_err(|e| format!("SSH handshake failed: {e}"))?;

        match &self.config.key_path {
            Some(key) => sess
                .userauth_pubkey_file(&self.config.user, None, key, None)
                .map_err(|e| format!("SSH key authentication failed: {e}"))?,
            None => sess
                .userauth_agent(&self.config.user)
                .map_err(|e| format!("SSH agent authentication failed: {e}"))?,
        }

        if !sess.authenticated() {
            return Err("SSH authentication failed".to_string());
        }

        tracing::debug!(server, user = %self.config.user, "SSH session established");
        Ok(sess)
    }

    fn exec(sess: &ssh2::Session, command: &str) -> std::result::Result<String, String> {
        let mut channel = sess.channel_session().map_err(|e| e.to_string())?;
        channel.exec(command).map_err(|e| e.to_string())?;

        let mut stdout = String::new();
        channel
            .read_to_string(&mut stdout)
            .map_err(|e| format!("reading stdout: {e}"))?;
        let mut stderr = String::new();
        let _ = channel.stderr().read_to_string(&mut stderr);
        channel.wait_close().map_err(|e| e.to_string())?;

        let status = channel.exit_status().map_err(|e| e.to_string())?;
        if status != 0 {
            return Err(format!("exit status {status}: {}", stderr.trim()));
        }
        Ok(stdout)
    }
}

impl RemoteExec for SshExecutor {
    fn run(&self, server: &str, command: &str) -> Result<String> {
        let mut sessions = self.sessions.borrow_mut();
        if !sessions.contains_key(server) {
            let sess = self
                .connect(server)
                .map_err(|e| AuditError::remote(server, command, e))?;
            sessions.insert(server.to_string(), sess);
        }
        let sess = &sessions[server];

        tracing::debug!(server, command, "Running remote command");
        Self::exec(sess, command).map_err(|e| AuditError::remote(server, command, e))
    }
}
