use std::collections::BTreeSet;

/// The set of namespaces a load or watch covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NamespaceScope {
    /// One cluster-wide request.
    All,
    /// One request per namespace.
    Selected(BTreeSet<String>),
}

impl NamespaceScope {
    pub fn selected<I, S>(namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Selected(namespaces.into_iter().map(Into::into).collect())
    }

    /// Request keys for this scope: `None` is a cluster-wide request.
    ///
    /// Cluster-scoped kinds always collapse to a single cluster-wide key.
    pub fn keys(&self, namespaced: bool) -> Vec<Option<String>> {
        match self {
            Self::Selected(namespaces) if namespaced => {
                namespaces.iter().cloned().map(Some).collect()
            }
            _ => vec![None],
        }
    }

    pub fn contains(&self, namespace: &str) -> bool {
        match self {
            Self::All => true,
            Self::Selected(namespaces) => namespaces.contains(namespace),
        }
    }
}

impl Default for NamespaceScope {
    fn default() -> Self {
        Self::All
    }
}

/// Namespace selection of the cluster frame the stores belong to.
#[derive(Debug, Clone, Default)]
pub struct ClusterContext {
    all_namespaces: BTreeSet<String>,
    selected_namespaces: BTreeSet<String>,
    cluster_wide_listing: bool,
}

impl ClusterContext {
    pub fn new<I, S>(all_namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            all_namespaces: all_namespaces.into_iter().map(Into::into).collect(),
            selected_namespaces: BTreeSet::new(),
            cluster_wide_listing: false,
        }
    }

    /// Whether the user may list resources across all namespaces in one request.
    pub fn with_cluster_wide_listing(mut self, allowed: bool) -> Self {
        self.cluster_wide_listing = allowed;
        self
    }

    pub fn set_all_namespaces<I, S>(&mut self, namespaces: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.all_namespaces = namespaces.into_iter().map(Into::into).collect();
        self.selected_namespaces
            .retain(|namespace| self.all_namespaces.contains(namespace));
    }

    /// Selects namespaces; an empty selection means every namespace.
    pub fn select_namespaces<I, S>(&mut self, namespaces: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selected_namespaces = namespaces.into_iter().map(Into::into).collect();
    }

    pub fn all_namespaces(&self) -> &BTreeSet<String> {
        &self.all_namespaces
    }

    /// The namespaces views should show items from.
    pub fn context_namespaces(&self) -> BTreeSet<String> {
        if self.selected_namespaces.is_empty() {
            self.all_namespaces.clone()
        } else {
            self.selected_namespaces.clone()
        }
    }

    pub fn has_selected_all(&self) -> bool {
        let context = self.context_namespaces();
        !self.all_namespaces.is_empty() && self.all_namespaces.iter().all(|ns| context.contains(ns))
    }

    /// The scope stores should load: cluster-wide when everything is selected and allowed.
    pub fn load_scope(&self) -> NamespaceScope {
        if self.cluster_wide_listing && (self.has_selected_all() || self.all_namespaces.is_empty()) {
            NamespaceScope::All
        } else {
            NamespaceScope::Selected(self.context_namespaces())
        }
    }
}
