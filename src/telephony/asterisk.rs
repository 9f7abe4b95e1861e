//! Call origination through the Asterisk remote console
//!
//! Each call is placed with a single `asterisk -rx "channel originate ..."`
//! invocation. The local leg runs the player context, the other leg dials out
//! through the trunk context; both receive `<source>-<target>-<call_id>` as the
//! extension so the dialplan can tag its completion marker with the call-id.

use async_trait::async_trait;
use std::fmt;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use super::{CallOriginator, CallRequest, OriginateError, OriginateOutcome};

pub const DEFAULT_ASTERISK_BIN: &str = "asterisk";
pub const DEFAULT_PLAYER_CONTEXT: &str = "survey_example_player";
pub const DEFAULT_TRUNK_CONTEXT: &str = "survey_example_siptrunk";
pub const DEFAULT_ORIGINATE_TIMEOUT: Duration = Duration::from_secs(30);

/// How to reach the switch
#[derive(Clone)]
pub struct AsteriskSettings {
    /// Asterisk binary (or any program accepting `-rx <command>`)
    pub binary: String,
    /// Dialplan context for the local (player) leg
    pub player_context: String,
    /// Dialplan context for the outbound trunk leg
    pub trunk_context: String,
    /// Run the binary through `sudo -S`
    pub use_sudo: bool,
    /// Password written to `sudo`'s stdin
    pub sudo_password: Option<String>,
    /// Upper bound for one origination command
    pub timeout: Duration,
}

impl Default for AsteriskSettings {
    fn default() -> Self {
        Self {
            binary: DEFAULT_ASTERISK_BIN.to_string(),
            player_context: DEFAULT_PLAYER_CONTEXT.to_string(),
            trunk_context: DEFAULT_TRUNK_CONTEXT.to_string(),
            use_sudo: false,
            sudo_password: None,
            timeout: DEFAULT_ORIGINATE_TIMEOUT,
        }
    }
}

impl fmt::Debug for AsteriskSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsteriskSettings")
            .field("binary", &self.binary)
            .field("player_context", &self.player_context)
            .field("trunk_context", &self.trunk_context)
            .field("use_sudo", &self.use_sudo)
            .field(
                "sudo_password",
                &self.sudo_password.as_ref().map(|_| "<redacted>"),
            )
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Originates calls by shelling out to the Asterisk CLI
#[derive(Debug, Clone)]
pub struct AsteriskOriginator {
    settings: AsteriskSettings,
}

impl AsteriskOriginator {
    pub fn new(settings: AsteriskSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &AsteriskSettings {
        &self.settings
    }

    /// The console command passed to `-rx`
    pub fn originate_command(&self, request: &CallRequest) -> String {
        let token = request.dial_token();
        format!(
            "channel originate Local/{token}@{player}/n extension {token}@{trunk}",
            token = token,
            player = self.settings.player_context,
            trunk = self.settings.trunk_context,
        )
    }

    /// Program and arguments of the full invocation
    pub fn command_line(&self, request: &CallRequest) -> (String, Vec<String>) {
        let rx = vec!["-rx".to_string(), self.originate_command(request)];

        if self.settings.use_sudo {
            let mut args = vec!["-S".to_string(), self.settings.binary.clone()];
            args.extend(rx);
            ("sudo".to_string(), args)
        } else {
            (self.settings.binary.clone(), rx)
        }
    }
}

#[async_trait]
impl CallOriginator for AsteriskOriginator {
    async fn originate(&self, request: &CallRequest) -> Result<OriginateOutcome, OriginateError> {
        let (program, args) = self.command_line(request);
        info!(
            call_id = request.call_id,
            target = %request.target,
            source = %request.source,
            "Originating call"
        );
        debug!("Running {} {:?}", program, args);

        let pipe_password = self.settings.use_sudo && self.settings.sudo_password.is_some();

        let mut child = Command::new(&program)
            .args(&args)
            .stdin(if pipe_password {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| OriginateError::Spawn {
                program: program.clone(),
                source,
            })?;

        if let (Some(password), Some(mut stdin)) =
            (self.settings.sudo_password.as_ref(), child.stdin.take())
        {
            stdin.write_all(format!("{}\n", password).as_bytes()).await?;
        }

        let output = tokio::time::timeout(self.settings.timeout, child.wait_with_output())
            .await
            .map_err(|_| OriginateError::Timeout {
                seconds: self.settings.timeout.as_secs(),
            })??;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if output.status.success() {
            debug!(call_id = request.call_id, output = %stdout, "Switch accepted call");
            Ok(OriginateOutcome { output: stdout })
        } else {
            Err(OriginateError::Rejected {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}
