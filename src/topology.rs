//! Neighbor-claim bookkeeping, bidirectional BFS routing, and a
//! short-lived route cache.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::peer::{to_hex, PeerId};

const MAX_NEIGHBORS: usize = 20;
const MAX_ROUTE_CACHE_ENTRIES: usize = 500;
const ROUTE_CACHE_TTL: Duration = Duration::from_secs(5);
const DEFAULT_ROUTE_FRESHNESS_THRESHOLD: Duration = Duration::from_secs(60);

#[derive(Clone)]
struct CachedRoute {
    route: Option<Vec<String>>,
    cached_at: Instant,
}

/// Neighbor claims, freshness, and a route cache, with bidirectional-edge
/// verified BFS routing.
pub struct TopologyTracker {
    claims: HashMap<String, Vec<String>>,
    last_seen: HashMap<String, Instant>,
    route_cache: LruCache<String, CachedRoute>,
    route_freshness_threshold: Duration,
}

impl TopologyTracker {
    pub fn new(route_freshness_threshold: Duration) -> Self {
        Self {
            claims: HashMap::new(),
            last_seen: HashMap::new(),
            route_cache: LruCache::new(
                std::num::NonZeroUsize::new(MAX_ROUTE_CACHE_ENTRIES).unwrap(),
            ),
            route_freshness_threshold,
        }
    }

    /// Sanitizes `source` and each neighbor to exactly 32 bytes, drops
    /// self-loops, truncates to at most 20 neighbors, and invalidates any
    /// cached route that mentions `source`.
    pub fn update_neighbors(&mut self, source: &PeerId, neighbors: &[PeerId]) {
        self.update_neighbors_at(source, neighbors, Instant::now())
    }

    fn update_neighbors_at(&mut self, source: &PeerId, neighbors: &[PeerId], now: Instant) {
        let source_hex = to_hex(source);
        let mut deduped: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for n in neighbors {
            if n == source {
                continue;
            }
            let hex = to_hex(n);
            if seen.insert(hex.clone()) {
                deduped.push(hex);
            }
            if deduped.len() >= MAX_NEIGHBORS {
                break;
            }
        }
        self.claims.insert(source_hex.clone(), deduped);
        self.last_seen.insert(source_hex.clone(), now);
        self.invalidate_routes_touching(&source_hex);
    }

    /// Removes `peer` from both `claims` and `lastSeen`, invalidating any
    /// cached route that touches it.
    pub fn remove_peer(&mut self, peer: &PeerId) {
        let hex = to_hex(peer);
        self.claims.remove(&hex);
        self.last_seen.remove(&hex);
        self.invalidate_routes_touching(&hex);
    }

    /// Drops nodes whose last claim is older than `age` and clears the
    /// route cache outright.
    pub fn prune(&mut self, age: Duration) {
        self.prune_at(age, Instant::now())
    }

    fn prune_at(&mut self, age: Duration, now: Instant) {
        let stale: Vec<String> = self
            .last_seen
            .iter()
            .filter(|(_, ts)| now.duration_since(**ts) >= age)
            .map(|(k, _)| k.clone())
            .collect();
        for hex in stale {
            self.claims.remove(&hex);
            self.last_seen.remove(&hex);
        }
        self.route_cache.clear();
    }

    /// Degree (claimed neighbor count) of `peer`, or 0 if unknown.
    pub fn degree(&self, peer: &PeerId) -> usize {
        self.claims.get(&to_hex(peer)).map_or(0, Vec::len)
    }

    /// Finds a verified route from `start` to `goal`, returning the
    /// interior hops (excluding both endpoints) as hex strings. `None`
    /// means no route was found; the absence is itself cached.
    pub fn compute_route(
        &mut self,
        start: &PeerId,
        goal: &PeerId,
        max_hops: usize,
    ) -> Option<Vec<String>> {
        self.compute_route_at(start, goal, max_hops, Instant::now())
    }

    fn compute_route_at(
        &mut self,
        start: &PeerId,
        goal: &PeerId,
        max_hops: usize,
        now: Instant,
    ) -> Option<Vec<String>> {
        let start_hex = to_hex(start);
        let goal_hex = to_hex(goal);
        if start_hex == goal_hex {
            return Some(Vec::new());
        }

        let key = format!("{start_hex}:{goal_hex}:{max_hops}");
        if let Some(cached) = self.route_cache.get(&key) {
            if now.duration_since(cached.cached_at) < ROUTE_CACHE_TTL {
                return cached.route.clone();
            }
        }

        let route = self.bfs(&start_hex, &goal_hex, max_hops, now);
        self.route_cache.put(
            key,
            CachedRoute {
                route: route.clone(),
                cached_at: now,
            },
        );
        route
    }

    fn is_fresh(&self, hex: &str, now: Instant) -> bool {
        self.last_seen
            .get(hex)
            .is_some_and(|ts| now.duration_since(*ts) < self.route_freshness_threshold)
    }

    /// Breadth-first search gated on bidirectional, fresh edges. Neighbor
    /// expansion follows the source's claim insertion order, so equally
    /// short paths tie-break on that order.
    fn bfs(&self, start: &str, goal: &str, max_hops: usize, now: Instant) -> Option<Vec<String>> {
        if !self.is_fresh(start, now) {
            return None;
        }

        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(start.to_string());
        let mut queue: std::collections::VecDeque<Vec<String>> = std::collections::VecDeque::new();
        queue.push_back(vec![start.to_string()]);

        while let Some(path) = queue.pop_front() {
            if path.len() > max_hops + 1 {
                continue;
            }
            let current = path.last().unwrap();
            if !self.is_fresh(current, now) {
                continue;
            }
            let Some(neighbors) = self.claims.get(current) else {
                continue;
            };
            for next in neighbors {
                if visited.contains(next) {
                    continue;
                }
                if !self.is_fresh(next, now) {
                    continue;
                }
                // Bidirectional: `next` must also claim `current`.
                let reciprocates = self
                    .claims
                    .get(next)
                    .is_some_and(|back| back.iter().any(|n| n == current));
                if !reciprocates {
                    continue;
                }
                let mut next_path = path.clone();
                next_path.push(next.clone());
                if next == goal {
                    if next_path.len() > max_hops + 1 {
                        continue;
                    }
                    let mut interior = next_path;
                    interior.pop();
                    interior.remove(0);
                    return Some(interior);
                }
                visited.insert(next.clone());
                queue.push_back(next_path);
            }
        }
        None
    }

    fn invalidate_routes_touching(&mut self, hex: &str) {
        let keys: Vec<String> = self
            .route_cache
            .iter()
            .filter_map(|(key, cached)| {
                let mentions_key = key.split(':').any(|part| part == hex);
                let mentions_route = cached
                    .route
                    .as_ref()
                    .is_some_and(|r| r.iter().any(|h| h == hex));
                (mentions_key || mentions_route).then(|| key.clone())
            })
            .collect();
        for key in keys {
            self.route_cache.pop(&key);
        }
    }
}

impl Default for TopologyTracker {
    fn default() -> Self {
        Self::new(DEFAULT_ROUTE_FRESHNESS_THRESHOLD)
    }
}

/// Default hop ceiling for `compute_route` callers that don't override it.
pub const DEFAULT_MAX_HOPS: usize = 10;
