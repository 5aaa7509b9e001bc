use chrono::Utc;
use k8s_openapi::api::apps::v1::Deployment;

use crate::crd::{
    Address, Condition, ConditionStatus, ConditionType, KafkaChannelStatus,
};

/// Conditions that must all be True for the channel to be Ready.
pub const LOAD_BEARING: [ConditionType; 6] = [
    ConditionType::Addressable,
    ConditionType::Config,
    ConditionType::Topic,
    ConditionType::ChannelService,
    ConditionType::DispatcherService,
    ConditionType::DispatcherDeployment,
];

fn cond_rank(t: ConditionType) -> u8 {
    match t {
        ConditionType::Ready => 0,
        ConditionType::Addressable => 1,
        ConditionType::Config => 2,
        ConditionType::Topic => 3,
        ConditionType::ChannelService => 4,
        ConditionType::DispatcherService => 5,
        ConditionType::DispatcherDeployment => 6,
    }
}

impl KafkaChannelStatus {
    /// Reset every load-bearing condition (and Ready) to Unknown. The address
    /// is withdrawn until the channel service converges again.
    pub fn initialize_conditions(&mut self) {
        self.address = None;
        for t in LOAD_BEARING {
            self.set_condition(t, ConditionStatus::Unknown, None, None);
        }
    }

    pub fn get_condition(&self, type_: ConditionType) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    pub fn condition_status(
        &self,
        type_: ConditionType,
    ) -> Option<ConditionStatus> {
        self.get_condition(type_).map(|c| c.status)
    }

    pub fn is_ready(&self) -> bool {
        LOAD_BEARING.iter().all(|t| {
            self.condition_status(*t) == Some(ConditionStatus::True)
        })
    }

    pub fn mark_true(&mut self, type_: ConditionType) {
        self.set_condition(type_, ConditionStatus::True, None, None);
    }

    pub fn mark_false(
        &mut self,
        type_: ConditionType,
        reason: &str,
        message: &str,
    ) {
        self.set_condition(
            type_,
            ConditionStatus::False,
            Some(reason),
            Some(message),
        );
    }

    pub fn mark_unknown(
        &mut self,
        type_: ConditionType,
        reason: &str,
        message: &str,
    ) {
        self.set_condition(
            type_,
            ConditionStatus::Unknown,
            Some(reason),
            Some(message),
        );
    }

    /// Upsert a condition. The transition time only moves when the status
    /// value changes. Ready is recomputed after every change.
    pub fn set_condition(
        &mut self,
        type_: ConditionType,
        status: ConditionStatus,
        reason: Option<&str>,
        message: Option<&str>,
    ) {
        self.upsert(type_, status, reason, message);
        if type_ != ConditionType::Ready {
            self.recompute_ready();
        }
    }

    /// Publish (or clear) the channel's address.
    pub fn set_address(&mut self, url: Option<String>) {
        match url {
            Some(u) if !u.is_empty() => {
                self.address = Some(Address { url: Some(u) });
                self.mark_true(ConditionType::Addressable);
            }
            _ => {
                self.address = None;
                self.mark_false(
                    ConditionType::Addressable,
                    "EmptyHostname",
                    "hostname is the empty string",
                );
            }
        }
    }

    /// Mirror the dispatcher Deployment's Available condition.
    pub fn propagate_dispatcher_deployment(&mut self, dep: &Deployment) {
        let available = dep
            .status
            .as_ref()
            .and_then(|s| s.conditions.as_ref())
            .and_then(|cs| cs.iter().find(|c| c.type_ == "Available"));
        match available {
            Some(c) if c.status == "True" => {
                self.mark_true(ConditionType::DispatcherDeployment)
            }
            Some(c) => self.mark_false(
                ConditionType::DispatcherDeployment,
                "DispatcherDeploymentFalse",
                &format!(
                    "The status of Dispatcher Deployment is False: {} : {}",
                    c.reason.as_deref().unwrap_or(""),
                    c.message.as_deref().unwrap_or("")
                ),
            ),
            None => self.mark_unknown(
                ConditionType::DispatcherDeployment,
                "DispatcherDeploymentUnknown",
                "Dispatcher Deployment has not reported availability",
            ),
        }
    }

    fn recompute_ready(&mut self) {
        let statuses: Vec<Option<ConditionStatus>> = LOAD_BEARING
            .iter()
            .map(|t| self.condition_status(*t))
            .collect();
        if statuses.iter().all(|s| *s == Some(ConditionStatus::True)) {
            self.upsert(ConditionType::Ready, ConditionStatus::True, None, None);
            return;
        }
        let failed = LOAD_BEARING.iter().find_map(|t| {
            self.get_condition(*t)
                .filter(|c| c.status == ConditionStatus::False)
                .map(|c| (c.reason.clone(), c.message.clone()))
        });
        match failed {
            Some((reason, message)) => self.upsert(
                ConditionType::Ready,
                ConditionStatus::False,
                reason.as_deref(),
                message.as_deref(),
            ),
            None => self.upsert(
                ConditionType::Ready,
                ConditionStatus::Unknown,
                None,
                None,
            ),
        }
    }

    fn upsert(
        &mut self,
        type_: ConditionType,
        status: ConditionStatus,
        reason: Option<&str>,
        message: Option<&str>,
    ) {
        let now = Utc::now().to_rfc3339();
        match self.conditions.iter_mut().find(|c| c.type_ == type_) {
            Some(existing) => {
                if existing.status != status {
                    existing.last_transition_time = Some(now);
                }
                existing.status = status;
                existing.reason = reason.map(str::to_string);
                existing.message = message.map(str::to_string);
            }
            None => {
                self.conditions.push(Condition {
                    type_,
                    status,
                    reason: reason.map(str::to_string),
                    message: message.map(str::to_string),
                    last_transition_time: Some(now),
                });
                self.conditions
                    .sort_by(|a, b| cond_rank(a.type_).cmp(&cond_rank(b.type_)));
            }
        }
    }
}
