//! Lookup of the editing domain that owns a resource.

use super::EditingDomain;
use crate::base::Uri;
use parking_lot::RwLock;

/// Explicit registry of editing domains.
///
/// Domains are independent; the registry only answers which registered
/// domain holds a resource with a given URI.
#[derive(Debug, Default)]
pub struct DomainRegistry {
    domains: RwLock<Vec<EditingDomain>>,
}

impl DomainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a domain. Registering the same domain twice has no effect.
    pub fn register(&self, domain: &EditingDomain) {
        let mut domains = self.domains.write();
        if !domains.iter().any(|d| d.same_domain(domain)) {
            domains.push(domain.clone());
        }
    }

    pub fn remove(&self, domain: &EditingDomain) -> bool {
        let mut domains = self.domains.write();
        let before = domains.len();
        domains.retain(|d| !d.same_domain(domain));
        domains.len() != before
    }

    /// The first registered domain holding a resource at `uri`.
    pub fn find_by_resource_uri(&self, uri: &Uri) -> Option<EditingDomain> {
        self.domains
            .read()
            .iter()
            .find(|d| d.find_resource(uri).is_some())
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.domains.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ResourceOptions;
    use crate::model::Schema;

    #[test]
    fn test_find_by_resource_uri() {
        let schema = Schema::builder().build();
        let a = EditingDomain::new(schema.clone());
        let b = EditingDomain::new(schema);
        let registry = DomainRegistry::new();
        registry.register(&a);
        registry.register(&b);
        registry.register(&a);
        assert_eq!(registry.len(), 2);

        b.create_resource("mem:/b", ResourceOptions::AS_URI).unwrap();
        let found = registry.find_by_resource_uri(&Uri::new("mem:/b")).unwrap();
        assert!(found.same_domain(&b));
        assert!(registry.find_by_resource_uri(&Uri::new("mem:/missing")).is_none());

        assert!(registry.remove(&b));
        assert!(registry.find_by_resource_uri(&Uri::new("mem:/b")).is_none());
    }
}
