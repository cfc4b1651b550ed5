//! In-memory collaborators for unit tests

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use envforge_models::{
    Application, CustomResourceResponse, EnvironmentRecord, ResourceEvent, StackStatus, APP_TAG_KEY,
    ENV_TAG_KEY, SERVICE_TAG_KEY,
};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::aws::tagging::{CLUSTER_RESOURCE_TYPE, STACK_RESOURCE_TYPE};
use crate::aws::{AppDeployer, CallerIdentity, IdentityService, ResourceGetter, RoleDeleter, TaggedResource};
use crate::error::StackError;
use crate::names::outputs;
use crate::orchestrations::progress::{MilestoneUpdate, ProgressSink};
use crate::orchestrations::{EnvironmentAccess, EnvironmentClients, EnvironmentServices};
use crate::reconciler::ResponseSender;
use crate::stack::{Parameter, StackDeployer, StackDescription, StackGateway, StackSpec};
use crate::store::ConfigStore;

const TEST_ACCOUNT: &str = "111111111111";

pub fn event(id: &str, logical: &str, resource_type: &str, status: &str, reason: Option<&str>) -> ResourceEvent {
    ResourceEvent {
        event_id: id.to_string(),
        logical_name: logical.to_string(),
        resource_type: resource_type.to_string(),
        status: status.to_string(),
        status_reason: reason.map(str::to_string),
        timestamp: Utc::now(),
    }
}

fn pairs(values: &[(&str, &str)]) -> BTreeMap<String, String> {
    values.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

pub fn stack_description(name: &str, parameters: &[(&str, &str)], outputs: &[(&str, &str)]) -> StackDescription {
    StackDescription {
        name: name.to_string(),
        id: format!("arn:aws:cloudformation:us-west-2:{}:stack/{}/guid", TEST_ACCOUNT, name),
        status: StackStatus::CreateComplete,
        parameters: pairs(parameters),
        outputs: pairs(outputs),
        tags: BTreeMap::new(),
    }
}

pub fn application(name: &str, account_id: &str, domain: Option<&str>) -> Application {
    Application {
        name: name.to_string(),
        account_id: account_id.to_string(),
        domain: domain.map(str::to_string),
        tags: BTreeMap::new(),
    }
}

pub fn environment_record(app: &str, env: &str) -> EnvironmentRecord {
    let stack = format!("{}-{}", app, env);
    EnvironmentRecord {
        app: app.to_string(),
        name: env.to_string(),
        account_id: TEST_ACCOUNT.to_string(),
        region: "us-west-2".to_string(),
        manager_role_arn: format!("arn:aws:iam::{}:role/{}-EnvManagerRole", TEST_ACCOUNT, stack),
        execution_role_arn: format!("arn:aws:iam::{}:role/{}-CFNExecutionRole", TEST_ACCOUNT, stack),
        prod: false,
        custom_config: None,
    }
}

/// Account and region an environment stack materializes in
#[derive(Debug, Clone)]
pub struct EnvironmentOutputs {
    pub account: String,
    pub region: String,
}

pub fn environment_outputs(account: &str, region: &str) -> EnvironmentOutputs {
    EnvironmentOutputs {
        account: account.to_string(),
        region: region.to_string(),
    }
}

impl EnvironmentOutputs {
    fn stack(&self, name: &str) -> StackDescription {
        let role = |suffix: &str| format!("arn:aws:iam::{}:role/{}-{}", self.account, name, suffix);
        StackDescription {
            name: name.to_string(),
            id: format!("arn:aws:cloudformation:{}:{}:stack/{}/guid", self.region, self.account, name),
            status: StackStatus::CreateComplete,
            parameters: BTreeMap::new(),
            outputs: BTreeMap::from([
                (outputs::VPC_ID.to_string(), "vpc-1234".to_string()),
                (outputs::CLUSTER_ID.to_string(), format!("{}-Cluster", name)),
                (outputs::ENVIRONMENT_MANAGER_ROLE_ARN.to_string(), role("EnvManagerRole")),
                (outputs::CFN_EXECUTION_ROLE_ARN.to_string(), role("CFNExecutionRole")),
            ]),
            tags: BTreeMap::new(),
        }
    }
}

fn apply_parameters(stack: &mut StackDescription, parameters: &[Parameter]) {
    for parameter in parameters.iter().filter(|p| !p.use_previous) {
        stack.parameters.insert(parameter.key.clone(), parameter.value.clone());
    }
}

#[derive(Default)]
struct GatewayState {
    stacks: HashMap<String, StackDescription>,
    templates: HashMap<String, String>,
    events: HashMap<String, Vec<ResourceEvent>>,
    create_events: HashMap<String, Vec<ResourceEvent>>,
    events_error: Option<String>,
    create_error: Option<StackError>,
    materialize: Option<EnvironmentOutputs>,
    calls: Vec<String>,
    create_specs: Vec<StackSpec>,
    update_specs: Vec<StackSpec>,
    update_parameter_calls: Vec<(Vec<Parameter>, Option<String>)>,
    update_parameter_results: VecDeque<Result<(), StackError>>,
    on_wait: HashMap<String, Vec<(String, String)>>,
    final_status: HashMap<String, StackStatus>,
    hang_waits: bool,
    panic_on_describe: bool,
}

/// Stack gateway keeping stacks in memory and logging every mutating call
#[derive(Default)]
pub struct FakeStackGateway {
    state: Mutex<GatewayState>,
}

impl FakeStackGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, GatewayState> {
        self.state.lock().unwrap()
    }

    pub fn insert_stack(&self, stack: StackDescription) {
        self.state().stacks.insert(stack.name.clone(), stack);
    }

    pub fn insert_materialized_stack(&self, name: &str, outputs: EnvironmentOutputs) {
        self.insert_stack(outputs.stack(name));
    }

    /// Stacks created from now on expose environment outputs.
    pub fn on_create_materialize(&self, outputs: EnvironmentOutputs) {
        self.state().materialize = Some(outputs);
    }

    pub fn set_template(&self, name: &str, body: &str) {
        self.state().templates.insert(name.to_string(), body.to_string());
    }

    /// Events are given newest first.
    pub fn set_events(&self, name: &str, events: Vec<ResourceEvent>) {
        self.state().events.insert(name.to_string(), events);
    }

    /// Events the stack gains while it is created, newest first.
    pub fn emit_on_create(&self, name: &str, events: Vec<ResourceEvent>) {
        self.state().create_events.insert(name.to_string(), events);
    }

    pub fn fail_events_with(&self, message: &str) {
        self.state().events_error = Some(message.to_string());
    }

    pub fn fail_create_with(&self, error: StackError) {
        self.state().create_error = Some(error);
    }

    pub fn push_update_parameters_result(&self, result: Result<(), StackError>) {
        self.state().update_parameter_results.push_back(result);
    }

    /// Change a parameter during the next wait, as a concurrent update would.
    pub fn on_wait_set_parameter(&self, name: &str, key: &str, value: &str) {
        self.state()
            .on_wait
            .entry(name.to_string())
            .or_default()
            .push((key.to_string(), value.to_string()));
    }

    pub fn set_final_status(&self, name: &str, status: StackStatus) {
        self.state().final_status.insert(name.to_string(), status);
    }

    pub fn hang_waits(&self) {
        self.state().hang_waits = true;
    }

    pub fn panic_on_describe(&self) {
        self.state().panic_on_describe = true;
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn created_specs(&self) -> Vec<StackSpec> {
        self.state().create_specs.clone()
    }

    pub fn update_specs(&self) -> Vec<StackSpec> {
        self.state().update_specs.clone()
    }

    pub fn last_update_spec(&self) -> Option<StackSpec> {
        self.state().update_specs.last().cloned()
    }

    pub fn update_parameter_calls(&self) -> Vec<(Vec<Parameter>, Option<String>)> {
        self.state().update_parameter_calls.clone()
    }

    pub fn parameter(&self, name: &str, key: &str) -> Option<String> {
        self.state().stacks.get(name)?.parameters.get(key).cloned()
    }
}

#[async_trait]
impl StackGateway for FakeStackGateway {
    async fn create_and_wait(&self, spec: &StackSpec) -> Result<(), StackError> {
        let mut state = self.state();
        state.calls.push(format!("create_and_wait {}", spec.name));
        state.create_specs.push(spec.clone());
        if let Some(error) = state.create_error.take() {
            return Err(error);
        }
        if state.stacks.contains_key(&spec.name) {
            return Err(StackError::AlreadyExists(spec.name.clone()));
        }
        let mut stack = match &state.materialize {
            Some(outputs) => outputs.stack(&spec.name),
            None => stack_description(&spec.name, &[], &[]),
        };
        apply_parameters(&mut stack, &spec.parameters);
        stack.tags = spec.tags.clone();
        if let Some(body) = &spec.template_body {
            state.templates.insert(spec.name.clone(), body.clone());
        }
        state.stacks.insert(spec.name.clone(), stack);
        if let Some(mut created) = state.create_events.remove(&spec.name) {
            let existing = state.events.remove(&spec.name).unwrap_or_default();
            created.extend(existing);
            state.events.insert(spec.name.clone(), created);
        }
        Ok(())
    }

    async fn update_and_wait(&self, spec: &StackSpec) -> Result<(), StackError> {
        let mut state = self.state();
        state.calls.push(format!("update_and_wait {}", spec.name));
        state.update_specs.push(spec.clone());
        let stack = state
            .stacks
            .get_mut(&spec.name)
            .ok_or_else(|| StackError::NotFound(spec.name.clone()))?;
        apply_parameters(stack, &spec.parameters);
        stack.status = StackStatus::UpdateComplete;
        if let Some(body) = &spec.template_body {
            state.templates.insert(spec.name.clone(), body.clone());
        }
        Ok(())
    }

    async fn delete_and_wait(&self, name: &str, role_arn: Option<&str>) -> Result<(), StackError> {
        let mut state = self.state();
        match role_arn {
            Some(role) => state.calls.push(format!("delete_and_wait {} {}", name, role)),
            None => state.calls.push(format!("delete_and_wait {}", name)),
        }
        state.templates.remove(name);
        state
            .stacks
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StackError::NotFound(name.to_string()))
    }

    async fn describe_stack(&self, name: &str) -> Result<StackDescription, StackError> {
        let panic = self.state().panic_on_describe;
        if panic {
            panic!("describe_stack {} blew up", name);
        }
        let mut state = self.state();
        state.calls.push(format!("describe_stack {}", name));
        state
            .stacks
            .get(name)
            .cloned()
            .ok_or_else(|| StackError::NotFound(name.to_string()))
    }

    async fn list_stack_events(&self, name: &str) -> Result<Vec<ResourceEvent>, StackError> {
        let state = self.state();
        if let Some(message) = &state.events_error {
            return Err(StackError::Api {
                name: name.to_string(),
                operation: "describe events of",
                message: message.clone(),
            });
        }
        Ok(state.events.get(name).cloned().unwrap_or_default())
    }

    async fn template_body(&self, name: &str) -> Result<String, StackError> {
        let mut state = self.state();
        state.calls.push(format!("template_body {}", name));
        if !state.stacks.contains_key(name) {
            return Err(StackError::NotFound(name.to_string()));
        }
        Ok(state.templates.get(name).cloned().unwrap_or_default())
    }

    async fn update_parameters(
        &self,
        name: &str,
        parameters: &[Parameter],
        role_arn: Option<&str>,
    ) -> Result<(), StackError> {
        let mut state = self.state();
        state.calls.push(format!("update_parameters {}", name));
        state
            .update_parameter_calls
            .push((parameters.to_vec(), role_arn.map(str::to_string)));
        if let Some(Err(e)) = state.update_parameter_results.pop_front() {
            return Err(e);
        }
        let stack = state
            .stacks
            .get_mut(name)
            .ok_or_else(|| StackError::NotFound(name.to_string()))?;
        apply_parameters(stack, parameters);
        stack.status = StackStatus::UpdateComplete;
        Ok(())
    }

    async fn wait_until_stable(&self, name: &str) -> Result<StackStatus, StackError> {
        let (hang, status) = {
            let mut state = self.state();
            state.calls.push(format!("wait_until_stable {}", name));
            if let Some(changes) = state.on_wait.remove(name) {
                if let Some(stack) = state.stacks.get_mut(name) {
                    for (key, value) in changes {
                        stack.parameters.insert(key, value);
                    }
                }
            }
            let status = match state.final_status.get(name) {
                Some(status) => status.clone(),
                None => state
                    .stacks
                    .get(name)
                    .map(|s| s.status.clone())
                    .unwrap_or(StackStatus::NotFound),
            };
            (state.hang_waits, status)
        };
        if hang {
            std::future::pending::<()>().await;
        }
        Ok(status)
    }
}

#[derive(Default)]
pub struct FakeConfigStore {
    applications: Mutex<HashMap<String, Application>>,
    environments: Mutex<Vec<EnvironmentRecord>>,
}

impl FakeConfigStore {
    pub fn insert_application(&self, app: Application) {
        self.applications.lock().unwrap().insert(app.name.clone(), app);
    }

    pub fn insert_environment(&self, record: EnvironmentRecord) {
        self.environments.lock().unwrap().push(record);
    }

    pub fn environments(&self) -> Vec<EnvironmentRecord> {
        self.environments.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConfigStore for FakeConfigStore {
    async fn get_application(&self, name: &str) -> anyhow::Result<Option<Application>> {
        Ok(self.applications.lock().unwrap().get(name).cloned())
    }

    async fn create_application(&self, app: &Application) -> anyhow::Result<()> {
        self.insert_application(app.clone());
        Ok(())
    }

    async fn create_environment(&self, record: &EnvironmentRecord) -> anyhow::Result<()> {
        let mut environments = self.environments.lock().unwrap();
        match environments
            .iter_mut()
            .find(|e| e.app == record.app && e.name == record.name)
        {
            Some(existing) => *existing = record.clone(),
            None => environments.push(record.clone()),
        }
        Ok(())
    }

    async fn get_environment(&self, app: &str, name: &str) -> anyhow::Result<Option<EnvironmentRecord>> {
        Ok(self
            .environments
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.app == app && e.name == name)
            .cloned())
    }

    async fn delete_environment(&self, app: &str, name: &str) -> anyhow::Result<()> {
        self.environments
            .lock()
            .unwrap()
            .retain(|e| !(e.app == app && e.name == name));
        Ok(())
    }

    async fn list_environments(&self, app: &str) -> anyhow::Result<Vec<EnvironmentRecord>> {
        Ok(self
            .environments
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.app == app)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct FakeAppDeployer {
    calls: Mutex<Vec<String>>,
    add_env_error: Mutex<Option<String>>,
}

impl FakeAppDeployer {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fail_add_env(&self, message: &str) {
        *self.add_env_error.lock().unwrap() = Some(message.to_string());
    }
}

#[async_trait]
impl AppDeployer for FakeAppDeployer {
    async fn delegate_dns_permissions(&self, app: &Application, account_id: &str) -> anyhow::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("delegate_dns_permissions {} {}", app.name, account_id));
        Ok(())
    }

    async fn add_env_to_app(&self, app: &Application, account_id: &str, region: &str) -> anyhow::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("add_env_to_app {} {} {}", app.name, account_id, region));
        match self.add_env_error.lock().unwrap().clone() {
            Some(message) => Err(anyhow!(message)),
            None => Ok(()),
        }
    }
}

pub struct FakeIdentity {
    account: Mutex<String>,
    partition: Mutex<String>,
}

impl Default for FakeIdentity {
    fn default() -> Self {
        Self {
            account: Mutex::new(TEST_ACCOUNT.to_string()),
            partition: Mutex::new("aws".to_string()),
        }
    }
}

impl FakeIdentity {
    pub fn set_account(&self, account: &str) {
        *self.account.lock().unwrap() = account.to_string();
    }

    pub fn set_partition(&self, partition: &str) {
        *self.partition.lock().unwrap() = partition.to_string();
    }
}

#[async_trait]
impl IdentityService for FakeIdentity {
    async fn caller_identity(&self) -> anyhow::Result<CallerIdentity> {
        let account = self.account.lock().unwrap().clone();
        let arn = format!("arn:{}:iam::{}:user/tester", self.partition.lock().unwrap(), account);
        Ok(CallerIdentity::new(account, arn))
    }
}

#[derive(Default)]
pub struct FakeRoleDeleter {
    deleted: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
}

impl FakeRoleDeleter {
    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn fail_on(&self, role_arn: &str) {
        self.failing.lock().unwrap().insert(role_arn.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.lock().unwrap().clear();
    }
}

#[async_trait]
impl RoleDeleter for FakeRoleDeleter {
    async fn delete_role(&self, role_arn: &str) -> anyhow::Result<()> {
        if self.failing.lock().unwrap().contains(role_arn) {
            return Err(anyhow!("access denied"));
        }
        self.deleted.lock().unwrap().push(role_arn.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeResourceGetter {
    resources: Mutex<Vec<(String, TaggedResource)>>,
}

impl FakeResourceGetter {
    pub fn add_stack(&self, app: &str, env: &str, service: &str) {
        let arn = format!(
            "arn:aws:cloudformation:us-west-2:{}:stack/{}-{}-{}/guid",
            TEST_ACCOUNT, app, env, service
        );
        let tags = pairs(&[(APP_TAG_KEY, app), (ENV_TAG_KEY, env), (SERVICE_TAG_KEY, service)]);
        self.resources
            .lock()
            .unwrap()
            .push((STACK_RESOURCE_TYPE.to_string(), TaggedResource { arn, tags }));
    }

    pub fn add_cluster(&self, app: &str, env: &str, arn: &str) {
        let tags = pairs(&[(APP_TAG_KEY, app), (ENV_TAG_KEY, env)]);
        self.resources.lock().unwrap().push((
            CLUSTER_RESOURCE_TYPE.to_string(),
            TaggedResource {
                arn: arn.to_string(),
                tags,
            },
        ));
    }
}

#[async_trait]
impl ResourceGetter for FakeResourceGetter {
    async fn get_resources_by_tags(
        &self,
        resource_type: &str,
        tags: &BTreeMap<String, String>,
    ) -> anyhow::Result<Vec<TaggedResource>> {
        let matches = |resource: &TaggedResource| {
            tags.iter().all(|(key, value)| match resource.tags.get(key) {
                Some(actual) => value.is_empty() || actual == value,
                None => false,
            })
        };
        Ok(self
            .resources
            .lock()
            .unwrap()
            .iter()
            .filter(|(kind, resource)| kind == resource_type && matches(resource))
            .map(|(_, resource)| resource.clone())
            .collect())
    }
}

#[derive(Default)]
pub struct FakeResponseSender {
    sent: Mutex<Vec<CustomResourceResponse>>,
}

impl FakeResponseSender {
    pub fn sent(&self) -> Vec<CustomResourceResponse> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResponseSender for FakeResponseSender {
    async fn send(&self, _url: &str, response: &CustomResourceResponse) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(response.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingProgress {
    updates: Mutex<Vec<MilestoneUpdate>>,
}

impl RecordingProgress {
    pub fn updates(&self) -> Vec<MilestoneUpdate> {
        self.updates.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingProgress {
    fn report(&self, update: &MilestoneUpdate) {
        self.updates.lock().unwrap().push(update.clone());
    }
}

/// Hands out fixed clients and records which role and region were asked for
pub struct FakeEnvironmentAccess {
    clients: EnvironmentClients,
    requests: Mutex<Vec<(String, String)>>,
}

impl FakeEnvironmentAccess {
    pub fn new(clients: EnvironmentClients) -> Self {
        Self {
            clients,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl EnvironmentAccess for FakeEnvironmentAccess {
    async fn clients_for(&self, record: &EnvironmentRecord) -> anyhow::Result<EnvironmentClients> {
        self.requests
            .lock()
            .unwrap()
            .push((record.manager_role_arn.clone(), record.region.clone()));
        Ok(self.clients.clone())
    }
}

/// One fake per orchestration collaborator
pub struct Fakes {
    pub gateway: Arc<FakeStackGateway>,
    pub store: Arc<FakeConfigStore>,
    pub app_deployer: Arc<FakeAppDeployer>,
    pub identity: Arc<FakeIdentity>,
    pub app_identity: Arc<FakeIdentity>,
    pub roles: Arc<FakeRoleDeleter>,
    pub resources: Arc<FakeResourceGetter>,
    pub access: Arc<FakeEnvironmentAccess>,
}

fn deployer(gateway: Arc<dyn StackGateway>) -> StackDeployer {
    StackDeployer::new(gateway, Duration::from_millis(5))
}

impl Fakes {
    /// Existing environments are reached through the same gateway, roles and resources fakes.
    pub fn new() -> Self {
        let gateway = Arc::new(FakeStackGateway::new());
        let roles = Arc::new(FakeRoleDeleter::default());
        let resources = Arc::new(FakeResourceGetter::default());
        let access = Arc::new(FakeEnvironmentAccess::new(EnvironmentClients {
            gateway: gateway.clone(),
            deployer: deployer(gateway.clone()),
            roles: roles.clone(),
            resources: resources.clone(),
        }));
        Self {
            gateway,
            store: Arc::new(FakeConfigStore::default()),
            app_deployer: Arc::new(FakeAppDeployer::default()),
            identity: Arc::new(FakeIdentity::default()),
            app_identity: Arc::new(FakeIdentity::default()),
            roles,
            resources,
            access,
        }
    }

    pub fn services(&self) -> EnvironmentServices {
        let gateway: Arc<dyn StackGateway> = self.gateway.clone();
        EnvironmentServices {
            deployer: deployer(gateway.clone()),
            gateway,
            store: self.store.clone(),
            app_deployer: self.app_deployer.clone(),
            identity: self.identity.clone(),
            app_identity: self.app_identity.clone(),
            access: self.access.clone(),
        }
    }
}
