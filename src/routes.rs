//! Route groups composed from an ordered list of mutators.
//!
//! An [`ApiBuilder`] collects group mutators and applies them, in the order
//! they were added, to one [`RouteGroup`] bound to a base path. Every mutator
//! sees what earlier ones registered. Registering the same method and path
//! twice keeps the later handler, which is how hand-written routes override
//! generated ones.

use axum::Router;
use axum::handler::Handler;
use axum::routing::{MethodFilter, MethodRouter, on};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Post,
    Put,
    Delete,
}

impl Verb {
    pub const fn as_str(self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Delete => "DELETE",
        }
    }

    fn filter(self) -> MethodFilter {
        match self {
            Verb::Get => MethodFilter::GET,
            Verb::Post => MethodFilter::POST,
            Verb::Put => MethodFilter::PUT,
            Verb::Delete => MethodFilter::DELETE,
        }
    }
}

struct Registration<S> {
    verb: Verb,
    path: String,
    route: MethodRouter<S>,
}

pub struct RouteGroup<S = ()> {
    base: String,
    registrations: Vec<Registration<S>>,
}

impl<S> RouteGroup<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            registrations: Vec::new(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn get<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        self.route(Verb::Get, path, handler)
    }

    pub fn post<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        self.route(Verb::Post, path, handler)
    }

    pub fn put<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        self.route(Verb::Put, path, handler)
    }

    pub fn delete<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        self.route(Verb::Delete, path, handler)
    }

    /// Registers `handler` for `verb` on `path` relative to the group base,
    /// replacing any earlier handler for the same pair.
    pub fn route<H, T>(mut self, verb: Verb, path: &str, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        let path = self.full_path(path);
        let route = on(verb.filter(), handler);
        match self
            .registrations
            .iter_mut()
            .find(|existing| existing.verb == verb && existing.path == path)
        {
            Some(existing) => {
                tracing::debug!(method = verb.as_str(), path = %path, "Overriding route");
                existing.route = route;
            }
            None => self.registrations.push(Registration { verb, path, route }),
        }
        self
    }

    pub fn contains(&self, verb: Verb, path: &str) -> bool {
        let path = self.full_path(path);
        self.registrations
            .iter()
            .any(|existing| existing.verb == verb && existing.path == path)
    }

    /// Registered method and full path pairs, in registration order.
    pub fn registered(&self) -> Vec<(Verb, String)> {
        self.registrations
            .iter()
            .map(|existing| (existing.verb, existing.path.clone()))
            .collect()
    }

    pub fn into_router(self) -> Router<S> {
        let mut paths: Vec<(String, Vec<Verb>, MethodRouter<S>)> = Vec::new();
        for Registration { verb, path, route } in self.registrations {
            match paths.iter().position(|(existing, _, _)| *existing == path) {
                Some(idx) => {
                    let (path, mut verbs, merged) = paths.remove(idx);
                    verbs.push(verb);
                    paths.insert(idx, (path, verbs, merged.merge(route)));
                }
                None => paths.push((path, vec![verb], route)),
            }
        }

        let mut router = Router::new();
        for (path, verbs, route) in paths {
            let methods: Vec<&str> = verbs.iter().map(|verb| verb.as_str()).collect();
            tracing::info!("Registering route {} [{}]", path, methods.join(","));
            router = router.route(&path, route);
        }
        router
    }

    fn full_path(&self, path: &str) -> String {
        let full = format!("{}{}", self.base, path);
        if full.is_empty() { "/".to_string() } else { full }
    }
}

pub type GroupMutator<S> = Box<dyn FnOnce(RouteGroup<S>) -> RouteGroup<S>>;

pub struct ApiBuilder<S = ()> {
    mutators: Vec<GroupMutator<S>>,
}

impl<S> Default for ApiBuilder<S> {
    fn default() -> Self {
        Self {
            mutators: Vec::new(),
        }
    }
}

impl<S> ApiBuilder<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a mutator; it runs after every mutator added before it.
    pub fn with<F>(mut self, mutator: F) -> Self
    where
        F: FnOnce(RouteGroup<S>) -> RouteGroup<S> + 'static,
    {
        self.mutators.push(Box::new(mutator));
        self
    }

    /// Builds the group for `path` by running each mutator in order.
    pub fn group(self, path: &str) -> RouteGroup<S> {
        self.mutators
            .into_iter()
            .fold(RouteGroup::new(path), |group, mutator| mutator(group))
    }

    pub fn attach(self, router: Router<S>, path: &str) -> Router<S> {
        router.merge(self.group(path).into_router())
    }
}
