//! File exchange with the host.
//!
//! The host publishes its orders in a single file and collects one log file per player. Both
//! directions go through SFTP, with a fresh SSH connection per operation that is released before
//! returning. The network is expected to be flaky: every failure is logged and reported as `false`,
//! the caller simply tries again on its next poll.

use std::{
    io::{Read, Write},
    net::{TcpStream, ToSocketAddrs},
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context};
use ssh2::{Session, Sftp};
use tracing::{debug, info, instrument, warn};

use crate::configuration::{Configuration, RemoteConfig};

/// Push/pull access to the host's files.
pub trait SyncChannel {
    /// Replace the local mirror with the host's order feed. `false` means "no update available".
    fn fetch_feed(&mut self) -> bool;

    /// Upload the local event log to the host. `false` if the upload did not happen.
    fn push_log(&mut self) -> bool;
}

/// [`SyncChannel`] over SSH/SFTP with password authentication.
#[derive(Debug, Clone)]
pub struct SftpChannel {
    remote: RemoteConfig,
    mirror: PathBuf,
    event_log: PathBuf,
    upload_name: String,
}

struct Connection {
    session: Session,
    sftp: Sftp,
}

impl Connection {
    fn close(self) {
        let Connection { session, sftp } = self;
        drop(sftp);
        if let Err(e) = session.disconnect(None, "bye", None) {
            debug!("disconnect: {e}");
        }
    }
}

impl SftpChannel {
    /// A channel for the host and local files described by `config`.
    pub fn new(config: &Configuration) -> SftpChannel {
        SftpChannel {
            remote: config.remote.clone(),
            mirror: config.feed_mirror.clone(),
            event_log: config.event_log.clone(),
            upload_name: format!("player_{}.log", config.player_id),
        }
    }

    fn connect(&self) -> anyhow::Result<Connection> {
        let remote = &self.remote;
        let addr = (remote.host.as_str(), remote.port)
            .to_socket_addrs()
            .with_context(|| format!("could not resolve {}", remote.host))?
            .next()
            .ok_or_else(|| anyhow!("no address for {}", remote.host))?;
        let tcp = TcpStream::connect_timeout(&addr, remote.connect_timeout)
            .with_context(|| format!("could not reach {addr}"))?;

        let mut session = Session::new().context("could not create SSH session")?;
        session.set_tcp_stream(tcp);
        session.set_timeout(remote.connect_timeout.as_millis().min(u32::MAX as u128) as u32);
        session.handshake().context("SSH handshake failed")?;
        session
            .userauth_password(&remote.user, &remote.password)
            .with_context(|| format!("authentication failed for '{}'", remote.user))?;
        let sftp = session.sftp().context("could not open SFTP channel")?;
        Ok(Connection { session, sftp })
    }

    /// Run `f` on a fresh connection, which is closed whatever `f` returns.
    fn with_connection<T>(
        &self,
        f: impl FnOnce(&Sftp) -> anyhow::Result<T>,
    ) -> anyhow::Result<T> {
        let connection = self.connect()?;
        let result = f(&connection.sftp);
        connection.close();
        result
    }

    fn try_fetch_feed(&self) -> anyhow::Result<usize> {
        let feed_path = self.remote.feed_path();
        let bytes = self.with_connection(|sftp| {
            let mut file = sftp
                .open(Path::new(&feed_path))
                .with_context(|| format!("could not open remote feed {feed_path}"))?;
            let mut bytes = Vec::new();
            file.read_to_end(&mut bytes)
                .with_context(|| format!("could not read remote feed {feed_path}"))?;
            Ok(bytes)
        })?;
        replace_mirror(&self.mirror, &bytes)?;
        Ok(bytes.len())
    }

    fn try_push_log(&self) -> anyhow::Result<PathBuf> {
        let mut content = Vec::new();
        std::fs::File::open(&self.event_log)
            .and_then(|mut f| f.read_to_end(&mut content))
            .with_context(|| format!("could not read {}", self.event_log.display()))?;

        self.with_connection(|sftp| {
            let candidates = upload_candidates(&self.remote);
            let destination = match pick_upload_dir(&candidates, |dir| {
                sftp.stat(dir).map(|stat| stat.is_dir()).unwrap_or(false)
            }) {
                Some(dir) => dir.join(&self.upload_name),
                None => {
                    warn!("no upload directory found, using the session default");
                    PathBuf::from(&self.upload_name)
                }
            };

            let mut remote_file = sftp
                .create(&destination)
                .with_context(|| format!("could not create {}", destination.display()))?;
            remote_file
                .write_all(&content)
                .with_context(|| format!("could not write {}", destination.display()))?;
            Ok(destination)
        })
    }
}

impl SyncChannel for SftpChannel {
    #[instrument(skip(self), fields(host = %self.remote.host))]
    fn fetch_feed(&mut self) -> bool {
        match self.try_fetch_feed() {
            Ok(len) => {
                debug!("fetched feed ({len} bytes)");
                true
            }
            Err(e) => {
                warn!("feed not fetched: {e:#}");
                false
            }
        }
    }

    #[instrument(skip(self), fields(host = %self.remote.host))]
    fn push_log(&mut self) -> bool {
        match self.try_push_log() {
            Ok(destination) => {
                info!("log sent to {}", destination.display());
                true
            }
            Err(e) => {
                warn!("log not sent: {e:#}");
                false
            }
        }
    }
}

/// First of `candidates` that exists as a directory.
/// Directories tried for an upload, most preferred first: the receiving subdirectory of the base
/// dir, the base dir, then the receiving subdirectory of the session default directory.
fn upload_candidates(remote: &RemoteConfig) -> [PathBuf; 3] {
    let base = Path::new(&remote.base_dir);
    [
        base.join(&remote.upload_subdir),
        base.to_path_buf(),
        PathBuf::from(&remote.upload_subdir),
    ]
}

fn pick_upload_dir(candidates: &[PathBuf], is_dir: impl Fn(&Path) -> bool) -> Option<PathBuf> {
    candidates.iter().find(|dir| is_dir(dir)).cloned()
}

/// Overwrite the mirror at `path` with `content` as a whole, through a sibling temporary file.
fn replace_mirror(path: &Path, content: &[u8]) -> anyhow::Result<()> {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".part");
    let tmp = path.with_file_name(tmp_name);
    std::fs::write(&tmp, content).with_context(|| format!("could not write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("could not replace mirror {}", path.display()))
}
