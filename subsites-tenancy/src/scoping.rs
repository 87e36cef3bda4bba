//! Query Scoping
//!
//! Row-level subsite isolation for the data-access layer. The data-access
//! layer registers its subsite-scoped tables with a [`QueryScoper`] and calls
//! it on every select and on every new record.
//!
//! # Usage
//!
//! ```
//! use subsites_tenancy::{QueryScoper, SelectQuery, TenantContext, TenantId};
//!
//! let scoper = QueryScoper::new().register_table("Page", "SubsiteID");
//! let ctx = TenantContext::new(TenantId::new(2));
//!
//! let mut query = SelectQuery::new("Page");
//! scoper.scope_select(&ctx, &mut query);
//! assert_eq!(
//!     query.to_sql(),
//!     r#"SELECT * FROM "Page" WHERE ("SubsiteID" = 2 OR "SubsiteID" IS NULL OR "SubsiteID" = 0)"#
//! );
//! ```

use crate::context::TenantContext;
use crate::error::{TenantError, TenantResult};
use crate::tenant::TenantId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::trace;

/// Default subsite column on scoped tables.
pub const DEFAULT_TENANT_COLUMN: &str = "SubsiteID";

/// An entity type whose records belong to a subsite.
pub trait TenantScoped {
    /// Table holding the records
    const TABLE: &'static str;

    /// Column holding the owning subsite
    const COLUMN: &'static str = DEFAULT_TENANT_COLUMN;

    /// Owning subsite, `None` when unset
    fn tenant_id(&self) -> Option<TenantId>;

    /// Set the owning subsite
    fn set_tenant_id(&mut self, id: TenantId);
}

/// A fixed set of subsites a query is forced to read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForcedTenants(Vec<TenantId>);

impl ForcedTenants {
    /// Create from a list of IDs.
    pub fn new(ids: impl IntoIterator<Item = TenantId>) -> Self {
        let mut list = Vec::new();
        for id in ids {
            if !list.contains(&id) {
                list.push(id);
            }
        }
        Self(list)
    }

    /// Parse a comma-separated list such as `"1, 2,3"`.
    ///
    /// # Examples
    ///
    /// ```
    /// use subsites_tenancy::{ForcedTenants, TenantId};
    ///
    /// let forced = ForcedTenants::parse("1, 2,3").unwrap();
    /// assert_eq!(forced.ids(), &[TenantId::new(1), TenantId::new(2), TenantId::new(3)]);
    /// assert!(ForcedTenants::parse("1,two").is_err());
    /// ```
    pub fn parse(raw: &str) -> TenantResult<Self> {
        let ids = raw
            .split(',')
            .map(|part| TenantId::parse(part).ok_or_else(|| TenantError::Invalid(part.trim().to_string())))
            .collect::<TenantResult<Vec<_>>>()?;
        Ok(Self::new(ids))
    }

    /// The forced IDs
    pub fn ids(&self) -> &[TenantId] {
        &self.0
    }

    /// Whether `id` is one of the forced subsites.
    pub fn contains(&self, id: TenantId) -> bool {
        self.0.contains(&id)
    }
}

impl FromStr for ForcedTenants {
    type Err = TenantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ForcedTenants {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<String> = self.0.iter().map(|id| id.to_string()).collect();
        f.write_str(&ids.join(","))
    }
}

/// The row filter applied to scoped tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantPredicate {
    /// Rows of the current subsite, plus rows without a subsite (NULL or 0)
    Current(TenantId),
    /// Rows of any forced subsite
    Forced(ForcedTenants),
}

impl TenantPredicate {
    /// Render as a SQL condition on `column`.
    ///
    /// # Examples
    ///
    /// ```
    /// use subsites_tenancy::{ForcedTenants, TenantId, TenantPredicate};
    ///
    /// let current = TenantPredicate::Current(TenantId::new(4));
    /// assert_eq!(
    ///     current.to_sql("SubsiteID"),
    ///     r#""SubsiteID" = 4 OR "SubsiteID" IS NULL OR "SubsiteID" = 0"#
    /// );
    ///
    /// let main = TenantPredicate::Current(TenantId::MAIN);
    /// assert_eq!(main.to_sql("SubsiteID"), r#""SubsiteID" = 0 OR "SubsiteID" IS NULL"#);
    ///
    /// let forced = TenantPredicate::Forced(ForcedTenants::parse("1,2").unwrap());
    /// assert_eq!(forced.to_sql("SubsiteID"), r#""SubsiteID" IN (1, 2)"#);
    /// ```
    pub fn to_sql(&self, column: &str) -> String {
        let column = quote_ident(column);
        match self {
            TenantPredicate::Current(id) if id.is_main() => {
                format!("{col} = 0 OR {col} IS NULL", col = column)
            }
            TenantPredicate::Current(id) => {
                format!("{col} = {id} OR {col} IS NULL OR {col} = 0", col = column, id = id)
            }
            TenantPredicate::Forced(forced) => {
                let ids: Vec<String> = forced.ids().iter().map(|id| id.to_string()).collect();
                format!("{} IN ({})", column, ids.join(", "))
            }
        }
    }

    /// Whether a record owned by `owner` passes the filter.
    pub fn admits(&self, owner: Option<TenantId>) -> bool {
        match (self, owner) {
            (TenantPredicate::Current(_), None) => true,
            (TenantPredicate::Current(id), Some(owner)) => *id == owner || owner.is_main(),
            (TenantPredicate::Forced(_), None) => false,
            (TenantPredicate::Forced(forced), Some(owner)) => forced.contains(owner),
        }
    }
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// A minimal select statement the scoper can decorate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectQuery {
    table: String,
    conditions: Vec<String>,
    by_id: bool,
}

impl SelectQuery {
    /// Select every column of `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            conditions: Vec::new(),
            by_id: false,
        }
    }

    /// Add a raw condition
    pub fn filter(mut self, condition: impl Into<String>) -> Self {
        self.conditions.push(condition.into());
        self
    }

    /// Look a single record up by primary key.
    ///
    /// Lookups by ID are never scoped.
    pub fn by_id(mut self, id: u64) -> Self {
        self.conditions.push(format!("{} = {}", quote_ident("ID"), id));
        self.by_id = true;
        self
    }

    /// Target table
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Conditions, joined with `AND`
    pub fn conditions(&self) -> &[String] {
        &self.conditions
    }

    /// Whether the query filters on the primary key
    pub fn filters_on_id(&self) -> bool {
        self.by_id
    }

    /// Render the statement.
    pub fn to_sql(&self) -> String {
        let mut sql = format!("SELECT * FROM {}", quote_ident(&self.table));
        if !self.conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.conditions.join(" AND "));
        }
        sql
    }
}

/// Query interceptor adding the subsite filter to scoped tables.
#[derive(Debug, Clone, Default)]
pub struct QueryScoper {
    tables: HashMap<String, String>,
}

impl QueryScoper {
    /// Create a scoper with no scoped tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity type
    pub fn register<T: TenantScoped>(self) -> Self {
        self.register_table(T::TABLE, T::COLUMN)
    }

    /// Register a table and its subsite column
    pub fn register_table(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.tables.insert(table.into(), column.into());
        self
    }

    /// Whether `table` is subsite-scoped.
    pub fn is_scoped(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    /// The filter to apply in `ctx`, `None` while filtering is disabled.
    pub fn predicate(&self, ctx: &TenantContext) -> Option<TenantPredicate> {
        if !ctx.is_filtering_enabled() {
            return None;
        }
        Some(match ctx.forced_tenants() {
            Some(forced) => TenantPredicate::Forced(forced),
            None => TenantPredicate::Current(ctx.current_tenant_id()),
        })
    }

    /// Append the subsite filter to `query`.
    ///
    /// Returns whether a condition was added. Unregistered tables, lookups
    /// by ID and queries run while filtering is disabled are left alone.
    pub fn scope_select(&self, ctx: &TenantContext, query: &mut SelectQuery) -> bool {
        let Some(column) = self.tables.get(&query.table) else {
            return false;
        };
        if query.filters_on_id() {
            return false;
        }
        let Some(predicate) = self.predicate(ctx) else {
            trace!(table = %query.table, "Subsite filtering disabled");
            return false;
        };

        query.conditions.push(format!("({})", predicate.to_sql(column)));
        true
    }

    /// Assign the current subsite to a new record that has none.
    pub fn stamp_new<T: TenantScoped>(&self, ctx: &TenantContext, entity: &mut T) {
        let unset = entity.tenant_id().is_none_or(TenantId::is_main);
        if unset {
            entity.set_tenant_id(ctx.current_tenant_id());
        }
    }

    /// Apply the subsite filter to records already in memory.
    pub fn filter_records<T: TenantScoped>(&self, ctx: &TenantContext, records: Vec<T>) -> Vec<T> {
        if !self.is_scoped(T::TABLE) {
            return records;
        }
        match self.predicate(ctx) {
            Some(predicate) => records
                .into_iter()
                .filter(|r| predicate.admits(r.tenant_id()))
                .collect(),
            None => records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Page {
        title: &'static str,
        subsite: Option<TenantId>,
    }

    impl TenantScoped for Page {
        const TABLE: &'static str = "Page";

        fn tenant_id(&self) -> Option<TenantId> {
            self.subsite
        }

        fn set_tenant_id(&mut self, id: TenantId) {
            self.subsite = Some(id);
        }
    }

    fn page(title: &'static str, subsite: Option<u64>) -> Page {
        Page {
            title,
            subsite: subsite.map(TenantId::new),
        }
    }

    #[test]
    fn test_forced_parse() {
        let forced = ForcedTenants::parse(" 3 ,1,3").unwrap();
        assert_eq!(forced.ids(), &[TenantId::new(3), TenantId::new(1)]);
        assert_eq!(forced.to_string(), "3,1");

        assert!(matches!(ForcedTenants::parse("1,,2"), Err(TenantError::Invalid(_))));
        assert!(ForcedTenants::parse("").is_err());
    }

    #[test]
    fn test_predicate_admits() {
        let current = TenantPredicate::Current(TenantId::new(2));
        assert!(current.admits(Some(TenantId::new(2))));
        assert!(current.admits(None));
        assert!(current.admits(Some(TenantId::MAIN)));
        assert!(!current.admits(Some(TenantId::new(3))));

        let main = TenantPredicate::Current(TenantId::MAIN);
        assert!(main.admits(Some(TenantId::MAIN)));
        assert!(!main.admits(Some(TenantId::new(2))));

        let forced = TenantPredicate::Forced(ForcedTenants::new([TenantId::new(1)]));
        assert!(forced.admits(Some(TenantId::new(1))));
        assert!(!forced.admits(None));
        assert!(!forced.admits(Some(TenantId::MAIN)));
    }

    #[test]
    fn test_quotes_are_escaped() {
        let predicate = TenantPredicate::Current(TenantId::new(1));
        assert_eq!(predicate.to_sql("a\"b"), r#""a""b" = 1 OR "a""b" IS NULL OR "a""b" = 0"#);
    }

    #[test]
    fn test_scope_select() {
        let scoper = QueryScoper::new().register::<Page>();
        let ctx = TenantContext::new(TenantId::new(5));

        let mut query = SelectQuery::new("Page").filter("\"Title\" = 'Home'");
        assert!(scoper.scope_select(&ctx, &mut query));
        assert_eq!(
            query.to_sql(),
            r#"SELECT * FROM "Page" WHERE "Title" = 'Home' AND ("SubsiteID" = 5 OR "SubsiteID" IS NULL OR "SubsiteID" = 0)"#
        );

        let mut other = SelectQuery::new("Member");
        assert!(!scoper.scope_select(&ctx, &mut other));
        assert_eq!(other.to_sql(), r#"SELECT * FROM "Member""#);

        let mut by_id = SelectQuery::new("Page").by_id(9);
        assert!(!scoper.scope_select(&ctx, &mut by_id));
    }

    #[test]
    fn test_scope_select_respects_context_flags() {
        let scoper = QueryScoper::new().register::<Page>();
        let ctx = TenantContext::new(TenantId::new(5));

        ctx.run_unfiltered(|| {
            let mut query = SelectQuery::new("Page");
            assert!(!scoper.scope_select(&ctx, &mut query));
        });

        ctx.force_tenants(Some(ForcedTenants::new([TenantId::new(1), TenantId::new(2)])));
        let mut query = SelectQuery::new("Page");
        scoper.scope_select(&ctx, &mut query);
        assert_eq!(
            query.to_sql(),
            r#"SELECT * FROM "Page" WHERE ("SubsiteID" IN (1, 2))"#
        );
    }

    #[test]
    fn test_stamp_new() {
        let scoper = QueryScoper::new().register::<Page>();
        let ctx = TenantContext::new(TenantId::new(3));

        let mut fresh = page("Fresh", None);
        scoper.stamp_new(&ctx, &mut fresh);
        assert_eq!(fresh.subsite, Some(TenantId::new(3)));

        let mut main = page("Main", Some(0));
        scoper.stamp_new(&ctx, &mut main);
        assert_eq!(main.subsite, Some(TenantId::new(3)));

        let mut owned = page("Owned", Some(7));
        scoper.stamp_new(&ctx, &mut owned);
        assert_eq!(owned.subsite, Some(TenantId::new(7)));
    }

    #[test]
    fn test_filter_records() {
        let scoper = QueryScoper::new().register::<Page>();
        let ctx = TenantContext::new(TenantId::new(2));
        let records = vec![
            page("a", Some(1)),
            page("b", Some(2)),
            page("c", None),
            page("d", Some(0)),
        ];

        let visible = scoper.filter_records(&ctx, records.clone());
        let titles: Vec<_> = visible.iter().map(|p| p.title).collect();
        assert_eq!(titles, vec!["b", "c", "d"]);

        let all = ctx.run_unfiltered(|| scoper.filter_records(&ctx, records.clone()));
        assert_eq!(all.len(), 4);

        let unscoped = QueryScoper::new().filter_records(&ctx, records);
        assert_eq!(unscoped.len(), 4);
    }
}
