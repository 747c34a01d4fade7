//! Per-caller security group views.
//!
//! A non-admin caller only sees the security groups entitled to an
//! organization they manage, and within each group only the spaces of those
//! organizations. An entitled organization with no bound space still shows up,
//! as a placeholder entry, so the caller can tell "entitled but unused" apart
//! from "not entitled".
//!
//! # Flow
//!
//! 1. Resolve the caller's managed organizations.
//! 2. Load the entitlements of those organizations.
//! 3. Fetch the entitled groups upstream, in chunks.
//! 4. Resolve every bound space and its organization, in chunks.
//! 5. Rebuild both relationship lists per entitled organization.
//! 6. Sweep the entitlements whose group was not found.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{MAX_PER_PAGE, TuningConfig};
use crate::models::{Entitlement, Lifecycle, SecurityGroup, Space, SpaceRef};
use crate::storage::{EntitlementBackend, run_blocking};
use crate::upstream::{CloudController, chunk, dedup};
use crate::{Error, Result};

use super::{ConsistencySweeper, RoleResolver};

/// Page size used when the caller does not ask for one.
pub const DEFAULT_PER_PAGE: usize = 50;

const LIST_PATH: &str = "/v3/security_groups";

/// Accepted filters of the list endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    /// `names=` filter.
    pub names: Vec<String>,
    /// `guids=` filter.
    pub guids: Vec<String>,
    /// 1-based page number.
    pub page: Option<usize>,
    /// Page size.
    pub per_page: Option<usize>,
}

impl ListQuery {
    /// Parses decoded query pairs.
    ///
    /// Repeated `names`/`guids` parameters accumulate; comma-separated values
    /// are split.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an unknown parameter or an
    /// out-of-range page value.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut query = Self::default();
        for (key, value) in pairs {
            let value = value.as_ref();
            match key.as_ref() {
                "names" => query.names.extend(split_list(value)),
                "guids" => query.guids.extend(split_list(value)),
                "page" => query.page = Some(parse_bounded("page", value, usize::MAX)?),
                "per_page" => query.per_page = Some(parse_bounded("per_page", value, MAX_PER_PAGE)?),
                other => {
                    return Err(Error::InvalidInput(format!(
                        "Unknown query parameter '{other}'. Supported: names, guids, page, per_page"
                    )));
                },
            }
        }
        Ok(query)
    }

    fn href(&self, page: usize, per_page: usize) -> String {
        let mut params = url::form_urlencoded::Serializer::new(String::new());
        params.append_pair("page", &page.to_string());
        params.append_pair("per_page", &per_page.to_string());
        if !self.names.is_empty() {
            params.append_pair("names", &self.names.join(","));
        }
        if !self.guids.is_empty() {
            params.append_pair("guids", &self.guids.join(","));
        }
        format!("{LIST_PATH}?{}", params.finish())
    }
}

fn split_list(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_bounded(name: &str, value: &str, max: usize) -> Result<usize> {
    value
        .parse::<usize>()
        .ok()
        .filter(|n| (1..=max).contains(n))
        .ok_or_else(|| Error::InvalidInput(format!("{name} must be between 1 and {max}")))
}

/// A pagination link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLink {
    /// Relative URL of the page.
    pub href: String,
}

/// Pagination block of a list response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListPagination {
    /// Results across all pages.
    pub total_results: usize,
    /// Number of pages.
    pub total_pages: usize,
    /// First page.
    pub first: PageLink,
    /// Last page.
    pub last: PageLink,
    /// Next page, if any.
    pub next: Option<PageLink>,
    /// Previous page, if any.
    pub previous: Option<PageLink>,
}

/// List response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityGroupList {
    /// Pagination block.
    pub pagination: ListPagination,
    /// Groups on this page.
    pub resources: Vec<SecurityGroup>,
}

impl SecurityGroupList {
    /// Cuts the requested page out of the full result.
    #[must_use]
    pub fn paginate(all: Vec<SecurityGroup>, query: &ListQuery) -> Self {
        let per_page = query.per_page.unwrap_or(DEFAULT_PER_PAGE).max(1);
        let page = query.page.unwrap_or(1).max(1);
        let total_results = all.len();
        let total_pages = total_results.div_ceil(per_page).max(1);

        let resources = all
            .into_iter()
            .skip((page - 1).saturating_mul(per_page))
            .take(per_page)
            .collect();

        let link = |n: usize| PageLink {
            href: query.href(n, per_page),
        };
        Self {
            pagination: ListPagination {
                total_results,
                total_pages,
                first: link(1),
                last: link(total_pages),
                next: (page < total_pages).then(|| link(page + 1)),
                previous: (page > 1).then(|| link((page - 1).min(total_pages))),
            },
            resources,
        }
    }
}

/// Builds filtered security group views for organization managers.
#[derive(Clone)]
pub struct ViewReassembler {
    store: Arc<dyn EntitlementBackend>,
    upstream: Arc<dyn CloudController>,
    roles: RoleResolver,
    sweeper: ConsistencySweeper,
    group_chunk_size: usize,
    space_chunk_size: usize,
}

impl ViewReassembler {
    /// Creates a reassembler.
    #[must_use]
    pub fn new(
        store: Arc<dyn EntitlementBackend>,
        upstream: Arc<dyn CloudController>,
        tuning: &TuningConfig,
    ) -> Self {
        Self {
            roles: RoleResolver::new(Arc::clone(&upstream)),
            sweeper: ConsistencySweeper::new(
                Arc::clone(&store),
                Arc::clone(&upstream),
                tuning.security_group_chunk_size,
            ),
            store,
            upstream,
            group_chunk_size: tuning.security_group_chunk_size,
            space_chunk_size: tuning.space_chunk_size,
        }
    }

    /// Lists the groups visible to `user_guid`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store or any upstream lookup fails.
    pub async fn list(&self, user_guid: &str, query: &ListQuery) -> Result<SecurityGroupList> {
        let managed = self.roles.managed_org_ids(user_guid).await?;
        if managed.is_empty() {
            return Ok(SecurityGroupList::paginate(Vec::new(), query));
        }

        let touched: Vec<Entitlement> = run_blocking(&self.store, move |store| {
            store.list_for_orgs(&managed)
        })
        .await?
        .into_iter()
        .filter(|e| query.guids.is_empty() || query.guids.contains(&e.security_group_guid))
        .collect();
        if touched.is_empty() {
            return Ok(SecurityGroupList::paginate(Vec::new(), query));
        }

        let group_guids = dedup(touched.iter().map(|e| e.security_group_guid.as_str()));
        let mut groups = Vec::new();
        for guids in chunk(&group_guids, self.group_chunk_size) {
            groups.extend(
                self.upstream
                    .list_security_groups(&guids, &query.names)
                    .await?,
            );
        }
        let found: HashSet<String> = groups.iter().map(|g| g.guid.clone()).collect();

        let views = self.reassemble(groups, &touched).await?;

        if query.names.is_empty() {
            self.sweeper.reconcile_against(&touched, &found).await;
        } else {
            // a name filter hides groups that do exist
            self.sweeper.reconcile(&touched).await;
        }

        tracing::debug!(
            user_guid,
            entitlements = touched.len(),
            groups = views.len(),
            "Reassembled security group list"
        );
        Ok(SecurityGroupList::paginate(views, query))
    }

    /// Returns one group as seen by `user_guid`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if none of the caller's organizations is
    /// entitled to the group or the group does not exist upstream, so
    /// unentitled callers cannot learn whether it exists.
    pub async fn get(&self, user_guid: &str, security_group_guid: &str) -> Result<SecurityGroup> {
        let not_found = || {
            Error::NotFound(format!(
                "No security group found with guid '{security_group_guid}'"
            ))
        };

        let managed = self.roles.managed_org_ids(user_guid).await?;
        let group_guid = security_group_guid.to_string();
        let touched: Vec<Entitlement> = run_blocking(&self.store, move |store| {
            store.list_for_group(&group_guid)
        })
        .await?
        .into_iter()
        .filter(|e| managed.contains(&e.organization_guid))
        .collect();
        if touched.is_empty() {
            return Err(not_found());
        }

        let groups = self
            .upstream
            .list_security_groups(&[security_group_guid.to_string()], &[])
            .await?;
        let found: HashSet<String> = groups.iter().map(|g| g.guid.clone()).collect();
        let group = groups.into_iter().find(|g| g.guid == security_group_guid);

        let view = match group {
            Some(group) => self
                .reassemble(vec![group], &touched)
                .await?
                .into_iter()
                .next()
                .ok_or_else(not_found),
            None => Err(not_found()),
        };

        self.sweeper.reconcile_against(&touched, &found).await;
        view
    }

    async fn reassemble(
        &self,
        groups: Vec<SecurityGroup>,
        entitlements: &[Entitlement],
    ) -> Result<Vec<SecurityGroup>> {
        let space_guids = dedup(groups.iter().flat_map(SecurityGroup::bound_space_guids));

        let mut spaces: HashMap<String, Space> = HashMap::new();
        let mut org_names: HashMap<String, String> = HashMap::new();
        for guids in chunk(&space_guids, self.space_chunk_size) {
            let found = self.upstream.get_spaces_with_orgs(&guids).await?;
            spaces.extend(found.spaces.into_iter().map(|s| (s.guid.clone(), s)));
            org_names.extend(found.organizations.into_iter().map(|o| (o.guid, o.name)));
        }

        // entitled organizations without a bound space still need a name
        let unnamed: Vec<String> = dedup(entitlements.iter().map(|e| e.organization_guid.as_str()))
            .into_iter()
            .filter(|guid| !org_names.contains_key(guid))
            .collect();
        for guids in chunk(&unnamed, self.space_chunk_size) {
            let found = self.upstream.list_organizations(&guids).await?;
            org_names.extend(found.into_iter().map(|o| (o.guid, o.name)));
        }

        Ok(groups
            .into_iter()
            .map(|group| rebuild(group, entitlements, &spaces, &org_names))
            .collect())
    }
}

/// Replaces both relationship lists with the spaces of entitled organizations.
fn rebuild(
    mut group: SecurityGroup,
    entitlements: &[Entitlement],
    spaces: &HashMap<String, Space>,
    org_names: &HashMap<String, String>,
) -> SecurityGroup {
    let entitled_orgs = dedup(
        entitlements
            .iter()
            .filter(|e| e.security_group_guid == group.guid)
            .map(|e| e.organization_guid.as_str()),
    );

    for lifecycle in [Lifecycle::Running, Lifecycle::Staging] {
        let bound = std::mem::take(group.spaces_mut(lifecycle));
        let mut rebuilt = Vec::new();

        for org_guid in &entitled_orgs {
            let org_name = org_names.get(org_guid).map_or("", String::as_str);
            let mut seen = HashSet::new();

            for space in bound.iter().filter_map(|r| spaces.get(&r.guid)) {
                if space.organization_guid != *org_guid || !seen.insert(space.guid.as_str()) {
                    continue;
                }
                rebuilt.push(
                    SpaceRef {
                        guid: space.guid.clone(),
                        space_name: space.name.clone(),
                        org_guid: org_guid.clone(),
                        org_name: org_name.to_string(),
                        ..SpaceRef::default()
                    }
                    .in_lifecycle(lifecycle),
                );
            }

            if seen.is_empty() {
                rebuilt.push(SpaceRef::placeholder(org_guid, org_name, lifecycle));
            }
        }

        *group.spaces_mut(lifecycle) = rebuilt;
    }

    group
}
