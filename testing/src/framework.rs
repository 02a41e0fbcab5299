use emergency_dispatch::builtin::{FileTripRecorder, GraphDocument};
use emergency_dispatch::factory::{
    create_oracle, spawn_city_with, AgentConfig, DispatchConfig, GraphSource, PolicyConfig,
};
use emergency_dispatch::{
    JitterConfig, NegotiationConfig, Offer, RecordError, Role, SessionOutcome, TripRecord,
    TripRecorder,
};

use crate::prepare_test_dir;
use anyhow::{anyhow, Context};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};

#[derive(thiserror::Error)]
#[error("{error}\nCity traceback:\n\n{city_traceback}")]
pub struct FrameworkError {
    error: anyhow::Error,
    city_traceback: CityRecord,
}

/// Outcomes of negotiations reported by Requesters during single run.
#[derive(Clone, Debug, Default)]
pub struct CityRecord {
    pub outcomes: HashMap<String, Vec<SessionOutcome>>,
    /// Requesters, that didn't report all expected outcomes in time.
    pub timeouts: Vec<String>,
}

impl CityRecord {
    pub fn add(&mut self, requester: &str, outcome: SessionOutcome) {
        self.outcomes
            .entry(requester.to_string())
            .or_default()
            .push(outcome);
    }

    /// First outcome reported by Requester.
    pub fn outcome(&self, requester: &str) -> Option<&SessionOutcome> {
        self.outcomes
            .get(requester)
            .and_then(|outcomes| outcomes.first())
    }

    pub fn winner(&self, requester: &str) -> Option<&Offer> {
        match self.outcome(requester)? {
            SessionOutcome::Committed { winner, .. } => Some(winner),
            SessionOutcome::Failed { .. } => None,
        }
    }

    pub fn committed(&self) -> usize {
        self.outcomes
            .values()
            .flatten()
            .filter(|outcome| outcome.is_committed())
            .count()
    }
}

impl fmt::Display for CityRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.outcomes.keys().collect();
        names.sort();

        for name in names {
            writeln!(f, "[{}]", name)?;
            for outcome in &self.outcomes[name] {
                writeln!(f, "  {:?}", outcome)?;
            }
        }

        if !self.timeouts.is_empty() {
            writeln!(f, "Timed out: {}", self.timeouts.join(", "))?;
        }
        Ok(())
    }
}

/// Runs agents on in-process bus and waits until each Requester reports
/// outcome of its negotiations.
pub struct Framework {
    pub config: DispatchConfig,
    pub recorder: Arc<dyn TripRecorder>,
    /// Sessions, that Requester will start in addition to the first one.
    pub extra_requests: HashMap<String, usize>,

    pub test_dir: PathBuf,
    pub test_timeout: Duration,
}

impl Framework {
    /// City on 10x10 grid, with short collection window and Requesters
    /// starting immediately.
    pub fn new(test_name: &str) -> anyhow::Result<Framework> {
        let _ = env_logger::builder().is_test(true).try_init();

        let test_dir = prepare_test_dir(test_name)?;

        Ok(Framework {
            recorder: Arc::new(FileTripRecorder::new(&test_dir)),
            config: DispatchConfig {
                graph: GraphSource::Grid {
                    width: 10,
                    height: 10,
                },
                output_dir: test_dir.clone(),
                negotiation: NegotiationConfig {
                    window: Duration::from_millis(300),
                    jitter: JitterConfig::none(),
                },
                directory: vec![],
                agents: vec![],
            },
            extra_requests: HashMap::new(),
            test_dir,
            test_timeout: Duration::from_secs(5),
        })
    }

    pub fn test_timeout(mut self, timeout: Duration) -> Self {
        self.test_timeout = timeout;
        self
    }

    pub fn window(mut self, window: Duration) -> Self {
        self.config.negotiation.window = window;
        self
    }

    pub fn jitter(mut self, jitter: JitterConfig) -> Self {
        self.config.negotiation.jitter = jitter;
        self
    }

    pub fn with_grid(mut self, width: usize, height: usize) -> Self {
        self.config.graph = GraphSource::Grid { width, height };
        self
    }

    /// Saves map in test directory, so city loads it like any other map file.
    pub fn with_graph(mut self, document: &GraphDocument) -> anyhow::Result<Self> {
        let path = self.test_dir.join("map.json");
        let content = serde_json::to_string_pretty(document)?;
        fs::write(&path, content)
            .with_context(|| format!("Writing map file: {}", path.display()))?;

        self.config.graph = GraphSource::File { path };
        Ok(self)
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn TripRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    /// Restricts Requesters' directory to listed addresses.
    pub fn directory(mut self, addresses: &[&str]) -> Self {
        self.config.directory = addresses.iter().map(|addr| addr.to_string()).collect();
        self
    }

    pub fn add_agent(mut self, agent: AgentConfig) -> Self {
        self.config.agents.push(agent);
        self
    }

    pub fn add_requester(self, name: &str, position: usize) -> Self {
        let mut agent = AgentConfig::new(name).at(position);
        agent.role = Some(Role::Requester);
        self.add_agent(agent)
    }

    pub fn add_provider(self, name: &str, position: usize) -> Self {
        let mut agent = AgentConfig::new(name).at(position);
        agent.role = Some(Role::Provider);
        self.add_agent(agent)
    }

    pub fn add_provider_with_policy(
        self,
        name: &str,
        position: usize,
        policy: &str,
        params: serde_yaml::Value,
    ) -> Self {
        let mut agent = AgentConfig::new(name).at(position);
        agent.role = Some(Role::Provider);
        agent.policy = Some(PolicyConfig {
            name: policy.to_string(),
            params,
        });
        self.add_agent(agent)
    }

    pub fn add_passive(self, name: &str, position: usize) -> Self {
        let mut agent = AgentConfig::new(name).at(position);
        agent.role = Some(Role::Passive);
        self.add_agent(agent)
    }

    pub fn request_more(mut self, requester: &str, count: usize) -> Self {
        *self
            .extra_requests
            .entry(requester.to_string())
            .or_default() += count;
        self
    }

    /// Trip written by `FileTripRecorder` to test directory.
    pub fn load_trip(&self, requester: &str) -> Result<TripRecord, RecordError> {
        FileTripRecorder::new(&self.test_dir).load(requester)
    }

    pub async fn run(&self) -> Result<CityRecord, FrameworkError> {
        let mut record = CityRecord::default();
        let oracle =
            create_oracle(&self.config.graph).map_err(|e| FrameworkError::from(e, &record))?;
        let mut city = spawn_city_with(&self.config, oracle, self.recorder.clone())
            .map_err(|e| FrameworkError::from(e, &record))?;

        for (addr, _) in &city.agents {
            let count = self
                .extra_requests
                .get(&addr.identity.name)
                .cloned()
                .unwrap_or(0);
            for _ in 0..count {
                addr.request_service()
                    .await
                    .map_err(|e| FrameworkError::from(e, &record))?;
            }
        }

        let deadline = Instant::now() + self.test_timeout;
        for (addr, callbacks) in &mut city.agents {
            if addr.identity.role != Role::Requester {
                continue;
            }

            let name = addr.identity.name.clone();
            let expected = 1 + self.extra_requests.get(&name).cloned().unwrap_or(0);
            for _ in 0..expected {
                match timeout_at(deadline, callbacks.outcome_channel.recv()).await {
                    Ok(Some(outcome)) => record.add(&name, outcome),
                    Ok(None) => {
                        let error = anyhow!("[{}] Outcome channel closed.", name);
                        return Err(FrameworkError::from(error, &record));
                    }
                    Err(_) => {
                        record.timeouts.push(name.clone());
                        break;
                    }
                }
            }
        }

        for (addr, _) in &city.agents {
            if let Err(e) = addr.shutdown().await {
                log::warn!("[{}] Shutdown failed: {}", addr.identity.name, e);
            }
        }

        if !record.timeouts.is_empty() {
            let error = anyhow!("Requesters didn't finish in {:?}.", self.test_timeout);
            return Err(FrameworkError::from(error, &record));
        }
        Ok(record)
    }
}

impl FrameworkError {
    pub fn from(error: impl Into<anyhow::Error>, record: &CityRecord) -> FrameworkError {
        FrameworkError {
            error: error.into(),
            city_traceback: record.clone(),
        }
    }
}

impl fmt::Debug for FrameworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}
