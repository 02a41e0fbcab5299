use anyhow::{anyhow, bail, Context};
use rand::{thread_rng, Rng};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dispatch_builtin::{AnswerAll, CityGraph, FileTripRecorder, ServiceRadius};
use dispatch_component::{OfferPolicy, RoutingOracle, TripRecorder};
use dispatch_protocol::{AgentIdentity, Position, Role};

use crate::actor::{AgentActor, AgentAddr, AgentCallbacks};
use crate::agent::{AgentSpec, Behavior, NegotiationConfig, Requester};
use crate::bus::LocalBus;
use crate::responder::ProviderResponder;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[non_exhaustive]
pub enum GraphSource {
    Grid { width: usize, height: usize },
    File { path: PathBuf },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub name: String,
    #[serde(default)]
    pub params: serde_yaml::Value,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    /// Defaults to `<name>@localhost`.
    #[serde(default)]
    pub address: Option<String>,
    /// Inferred from name if not set.
    #[serde(default)]
    pub role: Option<Role>,
    /// Random node if not set.
    #[serde(default)]
    pub position: Option<Position>,
    /// Used only by Providers. Defaults to answering all requests.
    #[serde(default)]
    pub policy: Option<PolicyConfig>,
}

impl AgentConfig {
    pub fn new(name: &str) -> AgentConfig {
        AgentConfig {
            name: name.to_string(),
            address: None,
            role: None,
            position: None,
            policy: None,
        }
    }

    pub fn at(mut self, position: usize) -> AgentConfig {
        self.position = Some(Position(position));
        self
    }

    pub fn role(&self) -> Role {
        self.role
            .unwrap_or_else(|| Role::infer_from_name(&self.name))
    }

    pub fn identity(&self) -> AgentIdentity {
        let address = self
            .address
            .clone()
            .unwrap_or_else(|| format!("{}@localhost", self.name));
        AgentIdentity::new(self.role(), &self.name, address)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DispatchConfig {
    pub graph: GraphSource,
    pub output_dir: PathBuf,
    #[serde(default)]
    pub negotiation: NegotiationConfig,
    /// Addresses of Providers, to which Requesters broadcast. All configured
    /// Providers if empty.
    #[serde(default)]
    pub directory: Vec<String>,
    pub agents: Vec<AgentConfig>,
}

impl DispatchConfig {
    pub fn load(path: &Path) -> anyhow::Result<DispatchConfig> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Reading config file: {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Parsing config file: {}", path.display()))
    }
}

/// Agents running on single bus.
pub struct City {
    pub bus: LocalBus,
    pub agents: Vec<(AgentAddr, AgentCallbacks)>,
}

pub fn create_oracle(source: &GraphSource) -> anyhow::Result<Arc<CityGraph>> {
    let graph = match source {
        GraphSource::Grid { width, height } => CityGraph::grid(*width, *height),
        GraphSource::File { path } => CityGraph::load_or_fallback(path)?,
    };
    Ok(Arc::new(graph))
}

pub fn create_policy(
    name: &str,
    params: serde_yaml::Value,
) -> anyhow::Result<Box<dyn OfferPolicy>> {
    let policy = match name {
        "AnswerAll" => Box::new(AnswerAll::new(params)?) as Box<dyn OfferPolicy>,
        "ServiceRadius" => Box::new(ServiceRadius::new(params)?) as Box<dyn OfferPolicy>,
        _ => bail!("BuiltIn offer policy {} doesn't exists.", name),
    };
    Ok(policy)
}

/// Identities of Providers, that Requesters will ask for service.
pub fn provider_directory(config: &DispatchConfig) -> Vec<AgentIdentity> {
    if config.directory.is_empty() {
        return config
            .agents
            .iter()
            .filter(|agent| agent.role() == Role::Provider)
            .map(AgentConfig::identity)
            .collect();
    }

    config
        .directory
        .iter()
        .map(|address| {
            config
                .agents
                .iter()
                .map(AgentConfig::identity)
                .find(|identity| &identity.address == address)
                .unwrap_or_else(|| {
                    // Provider running outside of this process.
                    let name = address.split('@').next().unwrap_or(address);
                    AgentIdentity::new(Role::Provider, name, address)
                })
        })
        .collect()
}

pub fn create_behavior(
    agent: &AgentConfig,
    providers: &[AgentIdentity],
    negotiation: &NegotiationConfig,
) -> anyhow::Result<Behavior> {
    Ok(match agent.role() {
        Role::Requester => {
            Behavior::Requester(Requester::new(providers.to_vec(), negotiation.clone()))
        }
        Role::Provider => {
            let policy: Box<dyn OfferPolicy> = match &agent.policy {
                Some(policy) => create_policy(&policy.name, policy.params.clone())
                    .with_context(|| format!("Creating offer policy for {}", agent.name))?,
                None => Box::new(AnswerAll {}),
            };
            Behavior::Provider(ProviderResponder::new(policy))
        }
        Role::Passive => Behavior::Passive,
    })
}

pub fn create_agent_specs(
    config: &DispatchConfig,
    oracle: Arc<dyn RoutingOracle>,
    recorder: Arc<dyn TripRecorder>,
) -> anyhow::Result<Vec<AgentSpec>> {
    let providers = provider_directory(config);
    let node_count = oracle.node_count();

    config
        .agents
        .iter()
        .map(|agent| {
            let position = match agent.position {
                Some(position) => {
                    if position.index() >= node_count {
                        log::warn!(
                            "[{}] Node {} doesn't exist on map with {} nodes.",
                            agent.name,
                            position,
                            node_count
                        );
                    }
                    position
                }
                None if node_count > 0 => Position(thread_rng().gen_range(0..node_count)),
                None => {
                    return Err(anyhow!(
                        "Can't place agent {} on map without nodes.",
                        agent.name
                    ))
                }
            };

            Ok(AgentSpec {
                identity: agent.identity(),
                position,
                behavior: create_behavior(agent, &providers, &config.negotiation)?,
                oracle: oracle.clone(),
                recorder: recorder.clone(),
            })
        })
        .collect()
}

pub fn spawn_agents(specs: Vec<AgentSpec>, bus: &LocalBus) -> Vec<(AgentAddr, AgentCallbacks)> {
    specs
        .into_iter()
        .map(|spec| AgentActor::spawn(spec, bus))
        .collect()
}

/// Starts all configured agents. Must be called inside actix System.
pub fn spawn_city(config: &DispatchConfig) -> anyhow::Result<City> {
    let oracle = create_oracle(&config.graph)?;
    let recorder = Arc::new(FileTripRecorder::new(&config.output_dir));
    spawn_city_with(config, oracle, recorder)
}

pub fn spawn_city_with(
    config: &DispatchConfig,
    oracle: Arc<dyn RoutingOracle>,
    recorder: Arc<dyn TripRecorder>,
) -> anyhow::Result<City> {
    let specs = create_agent_specs(config, oracle, recorder)?;
    let bus = LocalBus::new();
    let agents = spawn_agents(specs, &bus);
    Ok(City { bus, agents })
}
