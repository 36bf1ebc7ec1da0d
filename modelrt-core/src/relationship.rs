//! Relationship registry: undirected links between instances.
//!
//! Links are stored per relationship identifier ("R1", "R2", ...) in insertion
//! order. Storage keeps the orientation a link was created with, but every
//! query is orientation-agnostic. Multiplicity is not enforced here.

use crate::instance::InstanceRef;
use dashmap::DashMap;
use serde::Serialize;

/// One unordered pair of instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    pub a: InstanceRef,
    pub b: InstanceRef,
}

impl Link {
    /// Returns true if this link joins `x` and `y`, in either orientation.
    pub fn joins(&self, x: &InstanceRef, y: &InstanceRef) -> bool {
        (&self.a == x && &self.b == y) || (&self.a == y && &self.b == x)
    }

    /// Returns the endpoint opposite to `x`, if `x` participates.
    pub fn other(&self, x: &InstanceRef) -> Option<&InstanceRef> {
        if &self.a == x {
            Some(&self.b)
        } else if &self.b == x {
            Some(&self.a)
        } else {
            None
        }
    }

    fn touches(&self, x: &InstanceRef) -> bool {
        &self.a == x || &self.b == x
    }
}

/// Owns all relationship links, locked per relationship identifier.
#[derive(Default)]
pub struct RelationshipRegistry {
    links: DashMap<String, Vec<Link>>,
}

impl RelationshipRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Links `a` and `b` across `rel`.
    ///
    /// Returns false without mutating anything if either endpoint is absent
    /// or the pair is already linked.
    pub fn relate<'a>(
        &self,
        rel: &str,
        a: impl Into<Option<&'a InstanceRef>>,
        b: impl Into<Option<&'a InstanceRef>>,
    ) -> bool {
        let (Some(a), Some(b)) = (a.into(), b.into()) else {
            tracing::debug!("cannot relate a missing instance across {}", rel);
            return false;
        };

        let mut links = self.links.entry(rel.to_string()).or_default();
        if links.iter().any(|link| link.joins(a, b)) {
            return false;
        }
        links.push(Link {
            a: a.clone(),
            b: b.clone(),
        });
        tracing::debug!("{} linked to {} across {}", a, b, rel);
        true
    }

    /// Removes the link between `a` and `b`, whichever way round it was made.
    pub fn unrelate<'a>(
        &self,
        rel: &str,
        a: impl Into<Option<&'a InstanceRef>>,
        b: impl Into<Option<&'a InstanceRef>>,
    ) -> bool {
        let (Some(a), Some(b)) = (a.into(), b.into()) else {
            return false;
        };
        let Some(mut links) = self.links.get_mut(rel) else {
            return false;
        };

        let position = links
            .iter()
            .position(|link| &link.a == a && &link.b == b)
            .or_else(|| links.iter().position(|link| &link.a == b && &link.b == a));

        match position {
            Some(index) => {
                links.remove(index);
                tracing::debug!("{} unlinked from {} across {}", a, b, rel);
                true
            }
            None => false,
        }
    }

    /// Every instance linked to `source` across `rel`, in link order.
    pub fn select_related<'a>(
        &self,
        rel: &str,
        source: impl Into<Option<&'a InstanceRef>>,
    ) -> Vec<InstanceRef> {
        let Some(source) = source.into() else {
            return Vec::new();
        };
        self.links
            .get(rel)
            .map(|links| {
                links
                    .iter()
                    .filter_map(|link| link.other(source).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// First instance linked to `source` across `rel`.
    pub fn select_one_related<'a>(
        &self,
        rel: &str,
        source: impl Into<Option<&'a InstanceRef>>,
    ) -> Option<InstanceRef> {
        let source = source.into()?;
        let links = self.links.get(rel)?;
        links.iter().find_map(|link| link.other(source).cloned())
    }

    /// Returns true if `a` and `b` are linked across `rel`.
    pub fn is_related<'a>(
        &self,
        rel: &str,
        a: impl Into<Option<&'a InstanceRef>>,
        b: impl Into<Option<&'a InstanceRef>>,
    ) -> bool {
        let (Some(a), Some(b)) = (a.into(), b.into()) else {
            return false;
        };
        self.links
            .get(rel)
            .map(|links| links.iter().any(|link| link.joins(a, b)))
            .unwrap_or(false)
    }

    /// Drops the links of one relationship, or of all relationships.
    pub fn clear(&self, rel: Option<&str>) {
        match rel {
            Some(rel) => {
                self.links.remove(rel);
            }
            None => self.links.clear(),
        }
    }

    /// Removes every link that mentions `instance`, across all relationships.
    /// Returns the number of links removed.
    pub fn unlink_all(&self, instance: &InstanceRef) -> usize {
        let mut removed = 0;
        for mut entry in self.links.iter_mut() {
            let before = entry.value().len();
            entry.value_mut().retain(|link| !link.touches(instance));
            removed += before - entry.value().len();
        }
        if removed > 0 {
            tracing::debug!("removed {} link(s) of {}", removed, instance);
        }
        removed
    }

    /// Number of links across `rel`.
    pub fn count(&self, rel: &str) -> usize {
        self.links.get(rel).map(|links| links.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn vm() -> InstanceRef {
        InstanceRef::new("VM", "m-1")
    }

    fn product(id: &str) -> InstanceRef {
        InstanceRef::new("PRD", id)
    }

    #[test]
    fn test_relate_and_select() {
        let registry = RelationshipRegistry::new();
        let m = vm();
        let p = product("p-1");

        assert!(registry.relate("R1", &m, &p));
        assert_eq!(registry.select_related("R1", &m), vec![p.clone()]);
        assert_eq!(registry.select_related("R1", &p), vec![m.clone()]);
        assert_eq!(registry.select_one_related("R1", &p), Some(m.clone()));
        assert!(registry.is_related("R1", &p, &m));
        assert!(!registry.is_related("R2", &p, &m));
    }

    #[test]
    fn test_relate_rejects_missing_endpoint() {
        let registry = RelationshipRegistry::new();
        let m = vm();

        assert!(!registry.relate("R1", &m, None));
        assert!(!registry.relate("R1", None, &m));
        assert!(!registry.unrelate("R1", &m, None));
        assert!(!registry.is_related("R1", &m, None));
        assert!(registry.select_related("R1", None).is_empty());
        assert_eq!(registry.count("R1"), 0);
    }

    #[test]
    fn test_relate_twice_inserts_once() {
        let registry = RelationshipRegistry::new();
        let m = vm();
        let p = product("p-1");

        assert!(registry.relate("R1", &m, &p));
        assert!(!registry.relate("R1", &m, &p));
        assert!(!registry.relate("R1", &p, &m));
        assert_eq!(registry.select_related("R1", &m), vec![p]);
    }

    #[test]
    fn test_unrelate_either_orientation() {
        let registry = RelationshipRegistry::new();
        let m = vm();
        let p = product("p-1");

        registry.relate("R1", &m, &p);
        assert!(registry.unrelate("R1", &p, &m));
        assert!(!registry.is_related("R1", &m, &p));
        assert!(!registry.unrelate("R1", &m, &p));
    }

    #[test]
    fn test_select_related_preserves_link_order() {
        let registry = RelationshipRegistry::new();
        let m = vm();

        registry.relate("R1", &m, &product("b"));
        registry.relate("R1", &product("a"), &m);
        registry.relate("R1", &m, &product("c"));
        registry.relate("R1", &product("x"), &product("y"));

        let related = registry.select_related("R1", &m);
        assert_eq!(related, vec![product("b"), product("a"), product("c")]);
        assert_eq!(registry.select_one_related("R1", &m), Some(product("b")));
    }

    #[test]
    fn test_clear() {
        let registry = RelationshipRegistry::new();
        let m = vm();
        registry.relate("R1", &m, &product("a"));
        registry.relate("R2", &m, &product("b"));

        registry.clear(Some("R1"));
        assert_eq!(registry.count("R1"), 0);
        assert_eq!(registry.count("R2"), 1);

        registry.clear(None);
        assert_eq!(registry.count("R2"), 0);
    }

    #[test]
    fn test_unlink_all() {
        let registry = RelationshipRegistry::new();
        let m = vm();
        let p = product("a");
        registry.relate("R1", &m, &p);
        registry.relate("R3", &InstanceRef::new("TXN", "t"), &m);
        registry.relate("R1", &product("z"), &p);

        assert_eq!(registry.unlink_all(&m), 2);
        assert!(registry.select_related("R1", &m).is_empty());
        assert_eq!(registry.select_related("R1", &p), vec![product("z")]);
    }

    proptest! {
        #[test]
        fn prop_links_are_symmetric(pairs in prop::collection::vec((0u8..8, 0u8..8), 0..32)) {
            let registry = RelationshipRegistry::new();
            for (x, y) in &pairs {
                let a = product(&x.to_string());
                let b = InstanceRef::new("VM", y.to_string());
                if registry.relate("R1", &a, &b) {
                    prop_assert!(registry.select_related("R1", &a).contains(&b));
                    prop_assert!(registry.select_related("R1", &b).contains(&a));
                }
            }
        }

        #[test]
        fn prop_each_pair_linked_once(pairs in prop::collection::vec((0u8..4, 0u8..4), 0..32)) {
            let registry = RelationshipRegistry::new();
            for (x, y) in &pairs {
                let a = product(&x.to_string());
                let b = InstanceRef::new("VM", y.to_string());
                registry.relate("R1", &a, &b);
                registry.relate("R1", &b, &a);
                let hits = registry
                    .select_related("R1", &a)
                    .into_iter()
                    .filter(|r| r == &b)
                    .count();
                prop_assert_eq!(hits, 1);
            }
        }
    }
}
