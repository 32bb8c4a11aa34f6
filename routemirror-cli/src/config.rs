//! Configuration from the process environment

use thiserror::Error;

use routemirror_core::metrics::CountTarget;
use routemirror_core::reconciler::RouteTableTarget;

pub const TABLE_VAR: &str = "TABLE_MCCZ_VPC_ROUTES";
pub const PROD_TABLE_VAR: &str = "MCCZ_TGW_ROUTE_TABLE_ID_PROD";
pub const NONPROD_TABLE_VAR: &str = "MCCZ_TGW_ROUTE_TABLE_ID_NONPROD";
/// Shorter names, read when the deployed name is unset
pub const TABLE_ALIAS: &str = "ROUTE_MIRROR_TABLE";
pub const PROD_TABLE_ALIAS: &str = "ROUTE_TABLE_ID_PROD";
pub const NONPROD_TABLE_ALIAS: &str = "ROUTE_TABLE_ID_NONPROD";
pub const TOPIC_VAR: &str = "SNS_TOPIC_ARN";
pub const NAMESPACE_VAR: &str = "CW_METRIC_NAMESPACE";
pub const PROD_METRIC_VAR: &str = "CW_METRIC_PROD";
pub const NONPROD_METRIC_VAR: &str = "CW_METRIC_NONPROD";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Settings read once at startup. Each command checks for what it needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub table_name: Option<String>,
    pub prod_route_table_id: Option<String>,
    pub nonprod_route_table_id: Option<String>,
    pub sns_topic_arn: Option<String>,
    pub metric_namespace: Option<String>,
    pub prod_metric: Option<String>,
    pub nonprod_metric: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable lookup; blank values count as unset.
    /// An alias is only read when the deployed name is unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let get_either = |name: &str, alias: &str| get(name).or_else(|| get(alias));

        Self {
            table_name: get_either(TABLE_VAR, TABLE_ALIAS),
            prod_route_table_id: get_either(PROD_TABLE_VAR, PROD_TABLE_ALIAS),
            nonprod_route_table_id: get_either(NONPROD_TABLE_VAR, NONPROD_TABLE_ALIAS),
            sns_topic_arn: get(TOPIC_VAR),
            metric_namespace: get(NAMESPACE_VAR),
            prod_metric: get(PROD_METRIC_VAR),
            nonprod_metric: get(NONPROD_METRIC_VAR),
        }
    }

    pub fn table_name(&self) -> ConfigResult<&str> {
        require(&self.table_name, TABLE_VAR)
    }

    pub fn sns_topic_arn(&self) -> ConfigResult<&str> {
        require(&self.sns_topic_arn, TOPIC_VAR)
    }

    /// Route tables to reconcile, production first
    pub fn targets(&self) -> ConfigResult<Vec<RouteTableTarget>> {
        Ok(vec![
            RouteTableTarget::new("prod", require(&self.prod_route_table_id, PROD_TABLE_VAR)?),
            RouteTableTarget::new(
                "nonprod",
                require(&self.nonprod_route_table_id, NONPROD_TABLE_VAR)?,
            ),
        ])
    }

    /// Namespace and per-table metrics for the route count job
    pub fn count_targets(&self) -> ConfigResult<(String, Vec<CountTarget>)> {
        let namespace = require(&self.metric_namespace, NAMESPACE_VAR)?.to_string();
        let targets = vec![
            CountTarget::new(
                require(&self.prod_route_table_id, PROD_TABLE_VAR)?,
                require(&self.prod_metric, PROD_METRIC_VAR)?,
            ),
            CountTarget::new(
                require(&self.nonprod_route_table_id, NONPROD_TABLE_VAR)?,
                require(&self.nonprod_metric, NONPROD_METRIC_VAR)?,
            ),
        ];
        Ok((namespace, targets))
    }
}

fn require<'a>(value: &'a Option<String>, name: &'static str) -> ConfigResult<&'a str> {
    value.as_deref().ok_or(ConfigError::Missing(name))
}
