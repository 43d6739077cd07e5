//! List-query translation: raw query-string pairs → paged, sorted, filtered,
//! projected store query.

use thiserror::Error;

use crudforge_core::{Filter, FindQuery, Projection, Sort};

const SORT: &str = "sort";
const LIMIT: &str = "limit";
const PAGE: &str = "page";
const FIELDS: &str = "fields";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("{param} must be a positive integer")]
    NotPositiveInteger { param: &'static str, value: String },
}

/// Values used when a list request omits `limit` or `page`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryDefaults {
    pub limit: u64,
    pub page: u64,
}

impl Default for QueryDefaults {
    fn default() -> Self {
        Self { limit: 10, page: 1 }
    }
}

/// A translated list request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListParams {
    /// Equality constraints from every non-reserved parameter.
    pub filter: Filter,
    pub sort: Sort,
    pub limit: u64,
    /// 1-indexed page number.
    pub page: u64,
    pub projection: Option<Projection>,
}

impl ListParams {
    /// Translate query-string pairs.
    ///
    /// `sort`, `limit`, `page` and `fields` are reserved; everything else
    /// becomes a filter. When a key repeats, its last occurrence wins.
    pub fn from_query<I, K, V>(
        pairs: I,
        identity_field: &str,
        defaults: QueryDefaults,
    ) -> Result<Self, QueryError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut filter = Filter::new();
        let mut sort = None;
        let mut limit = None;
        let mut page = None;
        let mut fields = None;

        for (key, value) in pairs {
            let key = key.into();
            let value = value.into();
            match key.as_str() {
                SORT => sort = Some(value),
                LIMIT => limit = Some(value),
                PAGE => page = Some(value),
                FIELDS => fields = Some(value),
                _ => {
                    filter.insert(key, value);
                }
            }
        }

        let sort = sort
            .map(|raw| Sort::parse(&raw))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| Sort::newest_first(identity_field));

        Ok(Self {
            filter,
            sort,
            limit: positive(LIMIT, limit, defaults.limit)?,
            page: positive(PAGE, page, defaults.page)?,
            projection: fields.and_then(Projection::new),
        })
    }

    /// Records skipped before the requested page.
    pub fn offset(&self) -> u64 {
        self.limit.saturating_mul(self.page.saturating_sub(1))
    }

    pub fn find_query(&self) -> FindQuery {
        FindQuery {
            filter: self.filter.clone(),
            sort: self.sort.clone(),
            skip: self.offset(),
            limit: self.limit,
            projection: self.projection.clone(),
        }
    }
}

fn positive(param: &'static str, raw: Option<String>, default: u64) -> Result<u64, QueryError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.trim().parse::<u64>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(QueryError::NotPositiveInteger { param, value: raw }),
    }
}
