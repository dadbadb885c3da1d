use crate::{Error, Result};

/// A parsed Kubernetes API path such as `/apis/apps/v1/namespaces/default/deployments/web`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiLink {
    /// `/api` for the core group, `/apis` otherwise.
    pub api_prefix: String,
    /// `group/version`, or just `version` for the core group.
    pub api_version: String,
    pub namespace: Option<String>,
    /// Plural resource name.
    pub resource: String,
    pub name: Option<String>,
}

impl ApiLink {
    /// Parses a self-link or collection path. Query strings and subresources are ignored.
    pub fn parse(link: &str) -> Result<Self> {
        let invalid = || Error::InvalidApiLink(link.to_owned());

        let path = link.split(['?', '#']).next().unwrap_or_default();
        let parts: Vec<&str> = path.split('/').filter(|part| !part.is_empty()).collect();

        let (api_prefix, api_version, rest) = match parts.as_slice() {
            ["api", version, rest @ ..] => ("/api", (*version).to_owned(), rest),
            ["apis", group, version, rest @ ..] => ("/apis", format!("{group}/{version}"), rest),
            _ => return Err(invalid()),
        };

        let (namespace, resource, name) = match rest {
            ["namespaces", namespace, resource, tail @ ..] => (
                Some((*namespace).to_owned()),
                *resource,
                tail.first().copied(),
            ),
            // A namespace object itself, or the namespace collection.
            ["namespaces", tail @ ..] => (None, "namespaces", tail.first().copied()),
            [resource, tail @ ..] => (None, *resource, tail.first().copied()),
            [] => return Err(invalid()),
        };

        Ok(Self {
            api_prefix: api_prefix.to_owned(),
            api_version,
            namespace,
            resource: resource.to_owned(),
            name: name.map(ToOwned::to_owned),
        })
    }

    /// The group part of `api_version`, empty for the core group.
    pub fn api_group(&self) -> &str {
        self.api_version
            .rsplit_once('/')
            .map(|(group, _)| group)
            .unwrap_or_default()
    }

    /// The namespace-less collection path this link belongs to.
    pub fn api_base(&self) -> String {
        format!("{}/{}/{}", self.api_prefix, self.api_version, self.resource)
    }

    pub fn to_url(&self) -> String {
        let mut url = format!("{}/{}", self.api_prefix, self.api_version);
        if let Some(namespace) = &self.namespace {
            url.push_str("/namespaces/");
            url.push_str(namespace);
        }
        url.push('/');
        url.push_str(&self.resource);
        if let Some(name) = &self.name {
            url.push('/');
            url.push_str(name);
        }
        url
    }
}

/// Best-effort plural resource name for a kind, e.g. `NetworkPolicy` -> `networkpolicies`.
pub fn resource_name_for_kind(kind: &str) -> String {
    let lower = kind.to_lowercase();
    if lower == "endpoints" {
        lower
    } else if lower.ends_with('s') || lower.ends_with('x') {
        format!("{lower}es")
    } else if let Some(stem) = lower.strip_suffix('y') {
        if stem.ends_with(['a', 'e', 'i', 'o', 'u']) {
            format!("{lower}s")
        } else {
            format!("{stem}ies")
        }
    } else {
        format!("{lower}s")
    }
}
