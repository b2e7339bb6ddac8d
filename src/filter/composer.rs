use serde_json::Value;
use tracing::{debug, warn};

use super::{FilterError, FilterSet};
use crate::database::entity::EntityMeta;
use crate::services::RequestContext;

/// Declarative Filter Composer configuration for one resource.
///
/// Constraints are emitted in a fixed order: URL captures, then the owner
/// constraint, then query-string filters, then body filters.
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    /// `(capture name, field)` pairs taken from the matched route
    pub url_parts: Vec<(&'static str, &'static str)>,
    /// Scope rows to the authenticated user through the entity's owner column
    pub filter_by_creator: bool,
    /// `(query parameter, field)` pairs applied when the parameter is present
    pub allowed_filters: Vec<(&'static str, &'static str)>,
    /// `(body key, field)` pairs applied when the key is present
    pub json_filters: Vec<(&'static str, &'static str)>,
}

impl QueryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn url_part(mut self, capture: &'static str, field: &'static str) -> Self {
        self.url_parts.push((capture, field));
        self
    }

    pub fn by_creator(mut self) -> Self {
        self.filter_by_creator = true;
        self
    }

    pub fn allow(mut self, param: &'static str, field: &'static str) -> Self {
        self.allowed_filters.push((param, field));
        self
    }

    pub fn json(mut self, key: &'static str, field: &'static str) -> Self {
        self.json_filters.push((key, field));
        self
    }

    /// Build the Filter Set for a request against `entity`.
    pub fn compose(&self, entity: &'static EntityMeta, ctx: &RequestContext) -> Result<FilterSet, FilterError> {
        let mut filters = FilterSet::new();

        for &(capture, field) in &self.url_parts {
            let raw = ctx
                .captures
                .get(capture)
                .ok_or(FilterError::MissingCapture(capture))?;
            filters.push(field, coerce(entity, field, &Value::String(raw.clone()))?);
        }

        if self.filter_by_creator {
            if let Some(owner) = entity.owner_column {
                match &ctx.user {
                    Some(user) => {
                        filters.push(owner, user.id);
                    }
                    None => {
                        warn!("Owner-scoped filter on {} without a user, failing closed", entity.name);
                        return Err(FilterError::Unauthenticated);
                    }
                }
            }
        }

        for &(param, field) in &self.allowed_filters {
            if let Some(raw) = ctx.query.get(param) {
                filters.push(field, coerce(entity, field, &Value::String(raw.clone()))?);
            }
        }

        if let Some(Value::Object(body)) = &ctx.body {
            for &(key, field) in &self.json_filters {
                if let Some(value) = body.get(key) {
                    filters.push(field, coerce(entity, field, value)?);
                }
            }
        }

        debug!("Composed {} filter(s) for {}", filters.len(), entity.name);
        Ok(filters)
    }
}

fn coerce(entity: &'static EntityMeta, field: &'static str, value: &Value) -> Result<Value, FilterError> {
    let column = entity.column_def(field).ok_or(FilterError::InvalidColumn {
        entity: entity.name,
        column: field,
    })?;
    column
        .kind
        .coerce(value)
        .map_err(|reason| FilterError::InvalidValue { field, reason })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthUser;
    use crate::database::entity::{ColumnDef, ColumnKind};
    use crate::types::Method;
    use once_cell::sync::Lazy;
    use serde_json::json;

    static OWNER: Lazy<EntityMeta> = Lazy::new(|| EntityMeta::new("owner"));
    static NOTE: Lazy<EntityMeta> = Lazy::new(|| {
        EntityMeta::new("note")
            .column(ColumnDef::new("topic", ColumnKind::Text))
            .with_audit(|| &*OWNER)
    });

    fn ctx() -> RequestContext {
        RequestContext::new(Method::Get).with_capture("id", "12")
    }

    #[test]
    fn url_parts_are_coerced_by_column() {
        let filter = QueryFilter::new().url_part("id", "id");
        let filters = filter.compose(&NOTE, &ctx()).unwrap();
        assert_eq!(filters, FilterSet::new().with("id", 12));
    }

    #[test]
    fn creator_filter_fails_closed_without_user() {
        let filter = QueryFilter::new().by_creator();
        assert_eq!(filter.compose(&NOTE, &ctx()), Err(FilterError::Unauthenticated));
    }

    #[test]
    fn creator_filter_scopes_to_user() {
        let filter = QueryFilter::new().url_part("id", "id").by_creator();
        let ctx = ctx().with_user(AuthUser::new(5, Some("alice".into())));
        let filters = filter.compose(&NOTE, &ctx).unwrap();
        assert_eq!(filters, FilterSet::new().with("id", 12).with("created_by_id", 5));
    }

    #[test]
    fn creator_filter_ignored_without_owner_column() {
        let filter = QueryFilter::new().by_creator();
        assert!(filter.compose(&OWNER, &ctx()).unwrap().is_empty());
    }

    #[test]
    fn query_and_body_filters_follow_url_parts() {
        let filter = QueryFilter::new().url_part("id", "id").allow("topic", "topic").json("creator", "created_by_id");
        let ctx = ctx()
            .with_query("topic", "bank")
            .with_query("ignored", "x")
            .with_body(json!({"creator": 3}));
        let filters = filter.compose(&NOTE, &ctx).unwrap();
        assert_eq!(
            filters,
            FilterSet::new().with("id", 12).with("topic", "bank").with("created_by_id", 3)
        );
    }

    #[test]
    fn malformed_capture_is_rejected() {
        let filter = QueryFilter::new().url_part("id", "id");
        let ctx = RequestContext::new(Method::Get).with_capture("id", "abc");
        assert!(matches!(filter.compose(&NOTE, &ctx), Err(FilterError::InvalidValue { .. })));
        let missing = RequestContext::new(Method::Get);
        assert_eq!(filter.compose(&NOTE, &missing), Err(FilterError::MissingCapture("id")));
    }
}
