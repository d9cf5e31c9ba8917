//! Playwright browser automation
//!
//! A long-lived Node.js process hosts Playwright and speaks a JSON-lines
//! protocol on stdin/stdout. Commands carry an id and are acknowledged with
//! a `result` message; network and page events are pushed unsolicited.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use beaconcheck_common::config::Browser;
use beaconcheck_common::{Beacon, HarnessConfig, NetworkPattern};

use crate::driver::{BeaconListener, PageDriver, PageEvent};
use crate::error::{E2eError, E2eResult};

/// Extra time granted to the bridge beyond a command's own timeout
const REPLY_GRACE: Duration = Duration::from_secs(5);
const STARTUP_TIMEOUT: Duration = Duration::from_secs(60);

const BRIDGE_SCRIPT: &str = r##"
const readline = require('readline');
const playwright = require('playwright');

const emit = (msg) => process.stdout.write(JSON.stringify(msg) + '\n');

let listener = null;
let generation = 0;
const issuedUnder = new WeakMap();

function forward(request, status) {
  if (!listener) return;
  // Requests issued before the current listener belong to an earlier page
  if (issuedUnder.get(request) !== listener.generation) return;
  const url = request.url();
  const method = request.method();
  if (!listener.regex.test(url)) return;
  if (listener.method && listener.method !== method) return;
  emit({
    event: 'beacon', url, method, status, headers: request.headers(),
    generation: listener.generation
  });
}

(async () => {
  let browser;
  try {
    browser = await playwright['__BROWSER__'].launch({ headless: __HEADLESS__ });
  } catch (err) {
    emit({ event: 'fatal', message: err.message });
    process.exit(1);
  }
  const context = await browser.newContext({
    viewport: { width: __WIDTH__, height: __HEIGHT__ }
  });
  const page = await context.newPage();

  page.on('pageerror', (err) => emit({ event: 'page_error', message: err.message }));
  page.on('console', (msg) => {
    if (msg.type() === 'error') emit({ event: 'log', message: msg.text() });
  });
  page.on('request', (request) => issuedUnder.set(request, generation));
  page.on('requestfinished', async (request) => {
    const response = await request.response().catch(() => null);
    forward(request, response ? response.status() : 0);
  });
  page.on('requestfailed', (request) => {
    const failure = request.failure();
    if (failure && /ABORTED/.test(failure.errorText)) return;
    forward(request, 0);
  });

  const target = (cmd) => page.locator(cmd.locator).first();
  const handlers = {
    listen: async (cmd) => {
      generation = cmd.generation;
      listener = { regex: new RegExp(cmd.pattern), method: cmd.method, generation };
    },
    goto: async (cmd) => { await page.goto(cmd.url, { timeout: cmd.timeout_ms }); },
    wait_for: async (cmd) => {
      await target(cmd).waitFor({ state: 'visible', timeout: cmd.timeout_ms });
    },
    click: async (cmd) => { await target(cmd).click(); },
    type: async (cmd) => { await target(cmd).pressSequentially(cmd.value); },
    select: async (cmd) => { await target(cmd).selectOption(cmd.value); },
    close: async () => { await browser.close(); },
  };

  const rl = readline.createInterface({ input: process.stdin });
  let queue = Promise.resolve();
  rl.on('line', (line) => {
    queue = queue.then(async () => {
      let cmd;
      try {
        cmd = JSON.parse(line);
      } catch (err) {
        emit({ event: 'log', message: `unparseable command: ${line}` });
        return;
      }
      const handler = handlers[cmd.cmd];
      if (!handler) {
        emit({ event: 'result', id: cmd.id, ok: false, error: `unknown command ${cmd.cmd}` });
        return;
      }
      try {
        await handler(cmd);
        emit({ event: 'result', id: cmd.id, ok: true });
      } catch (err) {
        const kind = err.name === 'TimeoutError' ? 'timeout' : 'error';
        emit({ event: 'result', id: cmd.id, ok: false, error: err.message, kind });
      }
      if (cmd.cmd === 'close') process.exit(0);
    });
  });
  rl.on('close', async () => {
    await queue;
    await browser.close().catch(() => {});
    process.exit(0);
  });

  emit({ event: 'ready' });
})();
"##;

/// Configuration for Playwright
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub node_binary: PathBuf,
    pub browser: Browser,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub navigation_timeout: Duration,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self::from_harness(&HarnessConfig::default())
    }
}

impl PlaywrightConfig {
    pub fn from_harness(config: &HarnessConfig) -> Self {
        Self {
            node_binary: config.browser.node_binary.clone(),
            browser: config.browser.browser,
            headless: config.browser.headless,
            viewport_width: config.browser.viewport_width,
            viewport_height: config.browser.viewport_height,
            navigation_timeout: config.timing.navigation_timeout(),
        }
    }

    /// Render the bridge script for this configuration
    pub fn render_script(&self) -> String {
        BRIDGE_SCRIPT
            .replace("__BROWSER__", self.browser.as_str())
            .replace("__HEADLESS__", if self.headless { "true" } else { "false" })
            .replace("__WIDTH__", &self.viewport_width.to_string())
            .replace("__HEIGHT__", &self.viewport_height.to_string())
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum BridgeCommand<'a> {
    Listen { pattern: &'a str, method: Option<&'a str>, generation: u64 },
    Goto { url: &'a str, timeout_ms: u64 },
    WaitFor { locator: &'a str, timeout_ms: u64 },
    Click { locator: &'a str },
    Type { locator: &'a str, value: &'a str },
    Select { locator: &'a str, value: &'a str },
    Close,
}

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    id: u64,
    #[serde(flatten)]
    command: BridgeCommand<'a>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum BridgeMessage {
    Ready,
    Result {
        id: u64,
        ok: bool,
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        kind: Option<String>,
    },
    Beacon {
        url: String,
        method: String,
        #[serde(default)]
        status: u16,
        #[serde(default)]
        headers: HashMap<String, String>,
        #[serde(default)]
        generation: u64,
    },
    PageError { message: String },
    Log { message: String },
    Fatal { message: String },
}

#[derive(Debug, Clone, Default)]
struct Reply {
    ok: bool,
    error: Option<String>,
    kind: Option<String>,
}

impl Reply {
    fn reason(&self) -> String {
        self.error.clone().unwrap_or_else(|| "unknown error".to_string())
    }

    fn timed_out(&self) -> bool {
        self.kind.as_deref() == Some("timeout")
    }
}

/// The listener currently receiving events, tagged with its registration
struct Subscription {
    generation: u64,
    tx: mpsc::UnboundedSender<PageEvent>,
}

/// Routes bridge output to waiting commands and the current listener
#[derive(Clone, Default)]
struct Router {
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Reply>>>>,
    events: Arc<Mutex<Option<Subscription>>>,
    ready: Arc<Mutex<Option<oneshot::Sender<Result<(), String>>>>>,
}

impl Router {
    fn handle(&self, message: BridgeMessage) {
        match message {
            BridgeMessage::Ready => {
                if let Some(tx) = self.ready.lock().take() {
                    let _ = tx.send(Ok(()));
                }
            }
            BridgeMessage::Result { id, ok, error, kind } => {
                match self.pending.lock().remove(&id) {
                    Some(tx) => {
                        let _ = tx.send(Reply { ok, error, kind });
                    }
                    None => warn!("Reply for unknown command {}", id),
                }
            }
            BridgeMessage::Beacon { url, method, status, headers, generation } => {
                if !self.is_current(generation) {
                    debug!("Dropping {} from an earlier listener", url);
                    return;
                }
                let beacon = Beacon::capture(&url, &method, status, headers);
                debug!("Intercepted {} {} ({})", beacon.method, url, status);
                self.forward(PageEvent::Beacon(beacon));
            }
            BridgeMessage::PageError { message } => {
                debug!("Page error: {}", message);
                self.forward(PageEvent::ScriptError(message));
            }
            BridgeMessage::Log { message } => debug!("[bridge] {}", message),
            BridgeMessage::Fatal { message } => {
                error!("Playwright bridge failed: {}", message);
                if let Some(tx) = self.ready.lock().take() {
                    let _ = tx.send(Err(message));
                }
            }
        }
    }

    fn subscribe(&self, generation: u64, tx: mpsc::UnboundedSender<PageEvent>) {
        *self.events.lock() = Some(Subscription { generation, tx });
    }

    fn is_current(&self, generation: u64) -> bool {
        self.events
            .lock()
            .as_ref()
            .is_some_and(|sub| sub.generation == generation)
    }

    fn forward(&self, event: PageEvent) {
        if let Some(sub) = self.events.lock().as_ref() {
            let _ = sub.tx.send(event);
        }
    }

    /// Drop every waiter so callers observe the bridge going away
    fn disconnect(&self) {
        self.pending.lock().clear();
        self.events.lock().take();
        self.ready.lock().take();
    }
}

/// Page driver backed by a Playwright browser
pub struct PlaywrightDriver {
    child: Child,
    stdin: ChildStdin,
    router: Router,
    next_id: u64,
    generation: u64,
    navigation_timeout: Duration,
    _script_dir: TempDir,
}

impl PlaywrightDriver {
    /// Start the bridge and wait until the browser page is ready
    pub async fn launch(config: PlaywrightConfig) -> E2eResult<Self> {
        Self::check_node_installed(&config).await?;

        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("bridge.js");
        std::fs::write(&script_path, config.render_script())?;

        info!(
            "Launching {} via {} (headless: {})",
            config.browser.as_str(),
            config.node_binary.display(),
            config.headless
        );

        let mut child = Command::new(&config.node_binary)
            .arg(&script_path)
            .env("NODE_PATH", node_path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| E2eError::Playwright(format!("Failed to spawn bridge: {}", e)))?;

        let stdin = child.stdin.take().ok_or(E2eError::BridgeClosed)?;
        let stdout = child.stdout.take().ok_or(E2eError::BridgeClosed)?;

        let router = Router::default();
        let (ready_tx, ready_rx) = oneshot::channel();
        *router.ready.lock() = Some(ready_tx);

        let reader = router.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => match serde_json::from_str::<BridgeMessage>(&line) {
                        Ok(message) => reader.handle(message),
                        Err(_) => debug!("[bridge] {}", line),
                    },
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Failed reading bridge output: {}", e);
                        break;
                    }
                }
            }
            debug!("Bridge output closed");
            reader.disconnect();
        });

        match tokio::time::timeout(STARTUP_TIMEOUT, ready_rx).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(message))) => return Err(E2eError::Playwright(message)),
            Ok(Err(_)) => return Err(E2eError::BridgeClosed),
            Err(_) => return Err(E2eError::Timeout("Playwright bridge startup".to_string())),
        }
        info!("Browser ready");

        Ok(Self {
            child,
            stdin,
            router,
            next_id: 0,
            generation: 0,
            navigation_timeout: config.navigation_timeout,
            _script_dir: script_dir,
        })
    }

    /// Check that Node.js can be executed
    async fn check_node_installed(config: &PlaywrightConfig) -> E2eResult<()> {
        let status = Command::new(&config.node_binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::NodeNotFound(config.node_binary.display().to_string())),
        }
    }

    async fn request(&mut self, command: BridgeCommand<'_>, limit: Duration) -> E2eResult<Reply> {
        self.next_id += 1;
        let id = self.next_id;
        let (tx, rx) = oneshot::channel();
        self.router.pending.lock().insert(id, tx);

        let mut line = serde_json::to_string(&Envelope { id, command })?;
        debug!("-> {}", line);
        line.push('\n');
        if let Err(e) = self.stdin.write_all(line.as_bytes()).await {
            self.router.pending.lock().remove(&id);
            warn!("Failed writing to bridge: {}", e);
            return Err(E2eError::BridgeClosed);
        }
        self.stdin.flush().await?;

        match tokio::time::timeout(limit + REPLY_GRACE, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(E2eError::BridgeClosed),
            Err(_) => {
                self.router.pending.lock().remove(&id);
                Err(E2eError::Timeout(format!("bridge reply to command {}", id)))
            }
        }
    }

    async fn interact(&mut self, step: String, command: BridgeCommand<'_>) -> E2eResult<()> {
        let limit = self.navigation_timeout;
        let reply = self.request(command, limit).await?;
        if reply.ok {
            Ok(())
        } else {
            Err(E2eError::Interaction { step, reason: reply.reason() })
        }
    }

    /// Stop the bridge process
    fn stop(&mut self) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = self.child.id() {
                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            }
        }
        let _ = self.child.start_kill();
    }
}

#[async_trait]
impl PageDriver for PlaywrightDriver {
    async fn listen(&mut self, pattern: &NetworkPattern) -> E2eResult<BeaconListener> {
        let (tx, listener) = BeaconListener::channel();
        self.generation += 1;
        self.router.subscribe(self.generation, tx);

        let command = BridgeCommand::Listen {
            pattern: pattern.regex_source(),
            method: pattern.method(),
            generation: self.generation,
        };
        let reply = self.request(command, Duration::ZERO).await?;
        if !reply.ok {
            return Err(E2eError::Playwright(reply.reason()));
        }
        debug!("Listening for {}", pattern.glob());
        Ok(listener)
    }

    async fn navigate(&mut self, url: &str) -> E2eResult<()> {
        info!("Visiting {}", url);
        let limit = self.navigation_timeout;
        let timeout_ms = limit.as_millis() as u64;
        let reply = self.request(BridgeCommand::Goto { url, timeout_ms }, limit).await?;
        if reply.ok {
            Ok(())
        } else {
            Err(E2eError::Navigation { url: url.to_string(), reason: reply.reason() })
        }
    }

    async fn wait_for_visible(&mut self, locator: &str, timeout: Duration) -> E2eResult<()> {
        let timeout_ms = timeout.as_millis() as u64;
        let reply = self
            .request(BridgeCommand::WaitFor { locator, timeout_ms }, timeout)
            .await?;
        if reply.ok {
            Ok(())
        } else if reply.timed_out() {
            Err(E2eError::ElementNotFound { locator: locator.to_string(), timeout_ms })
        } else {
            Err(E2eError::Interaction {
                step: format!("wait for {}", locator),
                reason: reply.reason(),
            })
        }
    }

    async fn click(&mut self, locator: &str) -> E2eResult<()> {
        self.interact(format!("click {}", locator), BridgeCommand::Click { locator })
            .await
    }

    async fn type_text(&mut self, locator: &str, value: &str) -> E2eResult<()> {
        self.interact(format!("type {}", locator), BridgeCommand::Type { locator, value })
            .await
    }

    async fn select_option(&mut self, locator: &str, value: &str) -> E2eResult<()> {
        self.interact(format!("select {}", locator), BridgeCommand::Select { locator, value })
            .await
    }

    async fn close(&mut self) -> E2eResult<()> {
        info!("Closing browser");
        if let Err(e) = self.request(BridgeCommand::Close, Duration::ZERO).await {
            debug!("Bridge closed before acknowledging: {}", e);
        }
        self.router.disconnect();
        self.stop();
        let _ = self.child.wait().await;
        Ok(())
    }
}

impl Drop for PlaywrightDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Module search path for the bridge, so the script finds the project's
/// `node_modules` even though it lives in a temporary directory
fn node_path() -> String {
    let mut paths = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join("node_modules").display().to_string());
    }
    if let Ok(existing) = std::env::var("NODE_PATH") {
        if !existing.is_empty() {
            paths.push(existing);
        }
    }
    paths.join(":")
}
