use std::sync::Arc;

use crate::agents::SearchAgent;
use crate::jobs::model::Job;

/// How persistence derives a `url` for records that carry an identifier but
/// no link: `template` with `{id}` replaced by the record's `id_field` value.
#[derive(Debug, Clone)]
pub struct UrlHint {
    pub id_field: String,
    pub template: String,
}

impl UrlHint {
    pub fn new(id_field: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            id_field: id_field.into(),
            template: template.into(),
        }
    }

    pub fn url_for(&self, id: &str) -> String {
        self.template.replace("{id}", id)
    }
}

/// Payload fields that select a backend. A route matches when any of its
/// prompt ids, agent names or tags appears in the corresponding field of the
/// job payload.
#[derive(Debug, Clone, Default)]
pub struct Route {
    prompt_ids: Vec<String>,
    agents: Vec<String>,
    tags: Vec<String>,
}

impl Route {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prompt_id(mut self, id: &str) -> Self {
        self.prompt_ids.push(id.to_string());
        self
    }

    pub fn agent(mut self, name: &str) -> Self {
        self.agents.push(name.to_string());
        self
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_string());
        self
    }

    pub fn matches(&self, job: &Job) -> bool {
        let prompt_id = job.prompt_id();
        if !prompt_id.is_empty() && self.prompt_ids.iter().any(|p| *p == prompt_id) {
            return true;
        }
        let agent = job.agent();
        if !agent.is_empty() && self.agents.iter().any(|a| *a == agent) {
            return true;
        }
        let tags = job.tags();
        self.tags.iter().any(|t| tags.iter().any(|jt| jt == t))
    }
}

/// One dispatchable backend: the agent plus the optional URL template that
/// persistence uses to backfill links onto its records.
#[derive(Clone)]
pub struct Backend {
    agent: Arc<dyn SearchAgent>,
    url_hint: Option<UrlHint>,
}

impl Backend {
    pub fn new(agent: Arc<dyn SearchAgent>) -> Self {
        Self {
            agent,
            url_hint: None,
        }
    }

    pub fn with_url_hint(mut self, hint: UrlHint) -> Self {
        self.url_hint = Some(hint);
        self
    }

    pub fn name(&self) -> &str {
        self.agent.name()
    }

    pub fn agent(&self) -> &dyn SearchAgent {
        self.agent.as_ref()
    }

    pub fn url_hint(&self) -> Option<&UrlHint> {
        self.url_hint.as_ref()
    }
}

/// Ordered routing table. The first route whose fields match the payload
/// wins; jobs no route claims land on the fallback backend, so adding a
/// backend is a table entry, not a new branch in the dispatch loop.
pub struct Router {
    routes: Vec<(Route, Backend)>,
    fallback: Backend,
}

impl Router {
    pub fn new(fallback: Backend) -> Self {
        Self {
            routes: Vec::new(),
            fallback,
        }
    }

    pub fn add(&mut self, route: Route, backend: Backend) {
        self.routes.push((route, backend));
    }

    pub fn route(&self, job: &Job) -> &Backend {
        self.routes
            .iter()
            .find(|(route, _)| route.matches(job))
            .map(|(_, backend)| backend)
            .unwrap_or(&self.fallback)
    }
}
