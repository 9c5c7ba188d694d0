use std::fmt;

use crate::error::{Error, Result};

/// Structured identifier of a metric.
///
/// `name` may carry trailing tag fragments such as `requests[status:500]`; they
/// are kept verbatim and only interpreted when the name is flattened for the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricName {
    group: String,
    type_: String,
    scope: Option<String>,
    name: String,
}

impl MetricName {
    pub fn new(
        group: impl Into<String>,
        type_: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self> {
        let group = group.into();
        let type_ = type_.into();
        if group.is_empty() {
            return Err(Error::EmptyGroup);
        }
        if type_.is_empty() {
            return Err(Error::EmptyType);
        }

        Ok(Self {
            group,
            type_,
            scope: None,
            name: name.into(),
        })
    }

    pub fn scoped(
        group: impl Into<String>,
        type_: impl Into<String>,
        name: impl Into<String>,
        scope: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self::new(group, type_, name)?.with_scope(scope))
    }

    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn type_(&self) -> &str {
        &self.type_
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    pub fn has_scope(&self) -> bool {
        self.scope.is_some()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key used by [`crate::Registry::grouped_metrics`]: `group.type[.scope]`.
    pub fn group_key(&self) -> String {
        match &self.scope {
            Some(scope) => format!("{}.{}.{}", self.group, self.type_, scope),
            None => format!("{}.{}", self.group, self.type_),
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:type={}", self.group, self.type_)?;
        if let Some(scope) = &self.scope {
            write!(f, ",scope={scope}")?;
        }
        write!(f, ",name={}", self.name)
    }
}
