//! Countries and the zone-border graph.
//!
//! The graph is used to decide whether a network action is electrically
//! "close" to a constraint: two countries are neighbours within `n`
//! boundaries when the shortest border path between them has at most `n`
//! edges.

use petgraph::graph::{NodeIndex, UnGraph};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

/// ISO-like country (bidding zone) code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Country(String);

impl Country {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn code(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Country {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Undirected graph of country borders.
#[derive(Debug, Clone, Default)]
pub struct CountryGraph {
    graph: UnGraph<Country, ()>,
    index: HashMap<Country, NodeIndex>,
}

impl CountryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from a list of borders.
    pub fn from_borders<I, A, B>(borders: I) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        let mut graph = Self::new();
        for (a, b) in borders {
            graph.add_border(Country::new(a), Country::new(b));
        }
        graph
    }

    fn node(&mut self, country: Country) -> NodeIndex {
        if let Some(idx) = self.index.get(&country) {
            return *idx;
        }
        let idx = self.graph.add_node(country.clone());
        self.index.insert(country, idx);
        idx
    }

    pub fn add_border(&mut self, a: Country, b: Country) {
        let ia = self.node(a);
        let ib = self.node(b);
        if self.graph.find_edge(ia, ib).is_none() {
            self.graph.add_edge(ia, ib, ());
        }
    }

    pub fn contains(&self, country: &Country) -> bool {
        self.index.contains_key(country)
    }

    /// True when `b` is reachable from `a` crossing at most `max_boundaries` borders.
    ///
    /// A country is always its own neighbour. Countries missing from the
    /// graph are only neighbours of themselves.
    pub fn are_neighbors(&self, a: &Country, b: &Country, max_boundaries: usize) -> bool {
        if a == b {
            return true;
        }
        let (Some(&start), Some(&goal)) = (self.index.get(a), self.index.get(b)) else {
            return false;
        };

        let mut visited = HashSet::from([start]);
        let mut queue = VecDeque::from([(start, 0usize)]);
        while let Some((node, depth)) = queue.pop_front() {
            if node == goal {
                return true;
            }
            if depth == max_boundaries {
                continue;
            }
            for next in self.graph.neighbors(node) {
                if visited.insert(next) {
                    queue.push_back((next, depth + 1));
                }
            }
        }
        false
    }
}
