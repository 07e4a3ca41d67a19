//! Engine that replays a synthetic run without touching the network.
//!
//! Useful for hosts and tests that need realistic callback timing: server
//! discovery, latency, then download and upload progress ticks over the
//! configured durations.

use super::engine::{Engine, EngineError, EngineListener, EngineResult, EngineRun, Speed};
use crate::bridge::config::{ServerDescriptor, StartRequest};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Shape of the simulated link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkProfile {
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub latency_ms: i64,
    /// Interval between progress callbacks.
    pub tick: Duration,
}

impl Default for LinkProfile {
    fn default() -> Self {
        Self {
            download_mbps: 240.0,
            upload_mbps: 45.0,
            latency_ms: 18,
            tick: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SimulatedEngine {
    profile: LinkProfile,
    seed: Option<u64>,
}

impl SimulatedEngine {
    pub fn new(profile: LinkProfile) -> Self {
        Self {
            profile,
            seed: None,
        }
    }

    /// Makes every run draw the same speeds.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.profile.tick = tick;
        self
    }
}

impl Engine for SimulatedEngine {
    fn start(
        &self,
        request: StartRequest,
        listener: Arc<dyn EngineListener>,
    ) -> Result<Box<dyn EngineRun>, EngineError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| EngineError::Fatal("no async runtime available".to_string()))?;

        if let Some(server) = request.server() {
            if let Some(scheme) = server.scheme.as_deref() {
                if scheme != "http" && scheme != "https" {
                    return Err(EngineError::InvalidServers);
                }
            }
        }
        let options = request.options();
        if options.download_thread_count == 0 || options.upload_thread_count == 0 {
            return Err(EngineError::InvalidSettings);
        }

        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let script = Script {
            profile: self.profile,
            request,
            listener,
            rng,
        };
        debug!(mode = script.request.kind(), "Simulated run starting");
        let handle = runtime.spawn(script.play());
        Ok(Box::new(SimulatedRun { handle }))
    }
}

struct SimulatedRun {
    handle: JoinHandle<()>,
}

impl EngineRun for SimulatedRun {
    fn stop(&mut self) -> Result<(), EngineError> {
        self.handle.abort();
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Download,
    Upload,
}

struct Transfer {
    speed: Speed,
    transferred_mb: f64,
}

struct Script {
    profile: LinkProfile,
    request: StartRequest,
    listener: Arc<dyn EngineListener>,
    rng: StdRng,
}

fn discovered_servers() -> Vec<ServerDescriptor> {
    [
        ("speedtest.fra.example.net", "DE", "Frankfurt"),
        ("speedtest.ams.example.net", "NL", "Amsterdam"),
        ("speedtest.lon.example.net", "GB", "London"),
    ]
    .iter()
    .enumerate()
    .map(|(i, (domain, cc, city))| ServerDescriptor {
        id: Some(i as i64 + 1),
        scheme: Some("https".to_string()),
        domain: Some(domain.to_string()),
        download_path: Some("/speedtest/".to_string()),
        upload_path: Some("/speedtest/".to_string()),
        upload_script_name: Some("upload.php".to_string()),
        country_code: Some(cc.to_string()),
        city_name: Some(city.to_string()),
    })
    .collect()
}

impl Script {
    async fn play(mut self) {
        let tick = self.profile.tick;
        let options = self.request.options();

        tokio::time::sleep(tick).await;
        let servers = match self.request.server() {
            Some(server) => vec![server.clone()],
            None => discovered_servers(),
        };
        self.listener.on_servers_received(&servers);

        if options.connection_timeout_ms < 1_000 {
            self.listener
                .on_warning("Connection timeout below 1000 ms may abort slow servers");
        }

        tokio::time::sleep(tick).await;
        let server = servers[0].clone();
        let latency = self.profile.latency_ms + self.rng.gen_range(0..6);
        let jitter = self.rng.gen_range(1..4);
        self.listener.on_server_selected(&server, latency, jitter);

        self.listener.on_download_started();
        let download = self
            .transfer(Direction::Download, options.download_duration_ms, options.download_thread_count)
            .await;
        self.listener.on_download_finished(download.speed);

        self.listener.on_upload_started();
        let upload = self
            .transfer(Direction::Upload, options.upload_duration_ms, options.upload_thread_count)
            .await;
        self.listener.on_upload_finished(upload.speed);

        let free = self.request.is_free();
        let result = EngineResult {
            server,
            latency_ms: latency,
            jitter_ms: jitter,
            download: download.speed,
            upload: upload.speed,
            download_transferred_mb: download.transferred_mb,
            upload_transferred_mb: upload.transferred_mb,
            connection_type: "Ethernet".to_string(),
            device_info: format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
            ip: (!free).then(|| "203.0.113.7".to_string()),
            isp: (!free).then(|| "Example Broadband".to_string()),
            packet_loss_percent: (!free).then_some(0.0),
        };
        self.listener.on_finished(result);
    }

    async fn transfer(&mut self, direction: Direction, duration_ms: u64, threads: u32) -> Transfer {
        let tick = self.profile.tick;
        let tick_ms = tick.as_millis().max(1) as u64;
        let ticks = (duration_ms / tick_ms).max(1);
        let base = match direction {
            Direction::Download => self.profile.download_mbps,
            Direction::Upload => self.profile.upload_mbps,
        };
        // More threads saturate the link a little better.
        let thread_factor = (f64::from(threads) / 4.0).powf(0.25).min(1.2);

        let mut transferred_mb = 0.0;
        let mut samples = Vec::with_capacity(ticks as usize);

        for i in 1..=ticks {
            tokio::time::sleep(tick).await;
            let mbps = base * thread_factor * self.rng.gen_range(0.85..1.15);
            samples.push(mbps);
            transferred_mb += mbps * tick.as_secs_f64() / 8.0;

            let progress = i as f64 / ticks as f64;
            let speed = Speed::from_mbps(mbps);
            match direction {
                Direction::Download => {
                    self.listener.on_download_progress(progress, speed, transferred_mb)
                }
                Direction::Upload => self.listener.on_upload_progress(progress, speed, transferred_mb),
            }
        }

        let avg = samples.iter().sum::<f64>() / samples.len() as f64;
        Transfer {
            speed: Speed::from_mbps(avg),
            transferred_mb,
        }
    }
}
