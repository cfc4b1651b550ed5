//! Translation of raw stack events into environment creation milestones

use envforge_models::ResourceEvent;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Milestone {
    Vpc,
    InternetGateway,
    PublicSubnets,
    PrivateSubnets,
    RouteTables,
    EcsCluster,
}

impl Milestone {
    /// Milestones shown for an environment, in display order.
    pub fn for_environment(imports_vpc: bool) -> Vec<Milestone> {
        if imports_vpc {
            return vec![Milestone::EcsCluster];
        }
        vec![
            Milestone::Vpc,
            Milestone::InternetGateway,
            Milestone::PublicSubnets,
            Milestone::PrivateSubnets,
            Milestone::RouteTables,
            Milestone::EcsCluster,
        ]
    }

    /// Match an event by resource type and logical name.
    pub fn matching(event: &ResourceEvent) -> Option<Milestone> {
        let logical = event.logical_name.as_str();
        match event.resource_type.as_str() {
            "AWS::EC2::VPC" => Some(Milestone::Vpc),
            "AWS::EC2::InternetGateway" | "AWS::EC2::VPCGatewayAttachment" => Some(Milestone::InternetGateway),
            "AWS::EC2::Subnet" if logical.starts_with("Public") => Some(Milestone::PublicSubnets),
            "AWS::EC2::Subnet" if logical.starts_with("Private") => Some(Milestone::PrivateSubnets),
            "AWS::ECS::Cluster" => Some(Milestone::EcsCluster),
            _ if logical.contains("Route") => Some(Milestone::RouteTables),
            _ => None,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Milestone::Vpc => "A virtual private cloud to control networking of your resources",
            Milestone::InternetGateway => "An internet gateway to connect to the public internet",
            Milestone::PublicSubnets => "Public subnets for internet facing services",
            Milestone::PrivateSubnets => "Private subnets for services unreachable from the internet",
            Milestone::RouteTables => "Route tables for services to talk with each other",
            Milestone::EcsCluster => "An ECS cluster to group your services",
        }
    }
}

impl fmt::Display for Milestone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MilestoneState {
    InProgress,
    Complete,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MilestoneUpdate {
    pub milestone: Milestone,
    pub state: MilestoneState,
}

/// Receives milestone updates; rendering is up to the implementation
pub trait ProgressSink: Send + Sync {
    fn report(&self, update: &MilestoneUpdate);
}

/// Writes milestone updates to the log
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&self, update: &MilestoneUpdate) {
        info!("{}: {:?}", update.milestone, update.state);
    }
}

/// Folds per-resource states into one state per milestone.
///
/// A milestone completes once at least its expected number of resources has
/// been seen and every one of them completed. A failed resource fails the
/// milestone for good. Repeated states are dropped.
pub struct ProgressTracker {
    milestones: Vec<Milestone>,
    expected: HashMap<Milestone, usize>,
    resources: HashMap<Milestone, BTreeMap<String, MilestoneState>>,
    reported: HashMap<Milestone, MilestoneState>,
}

fn resource_state(status: &str, reason: Option<&str>) -> Option<MilestoneState> {
    if status.ends_with("_IN_PROGRESS") {
        Some(MilestoneState::InProgress)
    } else if status.ends_with("FAILED") {
        Some(MilestoneState::Failed(reason.unwrap_or_default().to_string()))
    } else if status.ends_with("_COMPLETE") {
        Some(MilestoneState::Complete)
    } else {
        None
    }
}

impl ProgressTracker {
    pub fn new(milestones: Vec<Milestone>) -> Self {
        Self {
            milestones,
            expected: HashMap::new(),
            resources: HashMap::new(),
            reported: HashMap::new(),
        }
    }

    /// Number of resources the milestone waits for; one when not set.
    pub fn expect(mut self, milestone: Milestone, count: usize) -> Self {
        self.expected.insert(milestone, count);
        self
    }

    /// Translate one event; returns the update to report, if any.
    pub fn observe(&mut self, event: &ResourceEvent) -> Option<MilestoneUpdate> {
        let milestone = Milestone::matching(event)?;
        if !self.milestones.contains(&milestone) {
            return None;
        }
        let state = resource_state(&event.status, event.status_reason.as_deref())?;

        let resources = self.resources.entry(milestone).or_default();
        let previous = resources.get(&event.logical_name);
        if !matches!(previous, Some(MilestoneState::Failed(_))) {
            resources.insert(event.logical_name.clone(), state);
        }

        let expected = self.expected.get(&milestone).copied().unwrap_or(1);
        let overall = match resources.values().find(|s| matches!(s, MilestoneState::Failed(_))) {
            Some(failed) => failed.clone(),
            None if resources.len() >= expected && resources.values().all(|s| *s == MilestoneState::Complete) => {
                MilestoneState::Complete
            }
            None => MilestoneState::InProgress,
        };
        if self.reported.get(&milestone) == Some(&overall) {
            return None;
        }
        self.reported.insert(milestone, overall.clone());
        Some(MilestoneUpdate {
            milestone,
            state: overall,
        })
    }
}
