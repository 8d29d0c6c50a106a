//! Prerequisite graph loaded from a TOML file.
//!
//! ```toml
//! [[concepts]]
//! id = "limits"
//! name = "Limits"
//! description = "Behaviour of a function near a point"
//! prerequisites = ["functions"]
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use mathprereq_shared::{Concept, ConceptRole, MathPrereqError, Result};

use crate::services::ConceptGraph;

#[derive(Debug, Clone, Deserialize)]
struct GraphFile {
    #[serde(default)]
    concepts: Vec<ConceptEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct ConceptEntry {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    prerequisites: Vec<String>,
}

/// In-memory prerequisite graph.
#[derive(Debug, Clone)]
pub struct FileConceptGraph {
    nodes: Vec<ConceptEntry>,
    by_id: HashMap<String, usize>,
}

impl FileConceptGraph {
    /// Parse and validate a TOML graph document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: GraphFile = toml::from_str(content)
            .map_err(|e| MathPrereqError::Graph(format!("invalid concept graph: {e}")))?;

        let mut by_id = HashMap::new();
        for (i, node) in file.concepts.iter().enumerate() {
            if by_id.insert(node.id.clone(), i).is_some() {
                return Err(MathPrereqError::Graph(format!(
                    "duplicate concept id '{}'",
                    node.id
                )));
            }
        }
        for node in &file.concepts {
            if let Some(missing) = node.prerequisites.iter().find(|p| !by_id.contains_key(*p)) {
                return Err(MathPrereqError::Graph(format!(
                    "concept '{}' lists unknown prerequisite '{missing}'",
                    node.id
                )));
            }
        }

        Ok(Self {
            nodes: file.concepts,
            by_id,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| MathPrereqError::io(path, e))?;
        let graph = Self::from_toml_str(&content)?;
        info!(path = %path.display(), concepts = graph.len(), "loaded concept graph");
        Ok(graph)
    }

    /// An empty graph: every lookup resolves to nothing.
    pub fn empty() -> Self {
        Self {
            nodes: Vec::new(),
            by_id: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Exact id or name match first, then name substring, ignoring case.
    fn resolve_name(&self, name: &str) -> Option<usize> {
        let needle = name.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        self.nodes
            .iter()
            .position(|n| n.id.to_lowercase() == needle || n.name.to_lowercase() == needle)
            .or_else(|| {
                self.nodes
                    .iter()
                    .position(|n| n.name.to_lowercase().contains(&needle))
            })
    }

    /// Ordered path for `names`: ancestors by distance then name, then targets by name.
    pub fn prerequisite_path(&self, names: &[String]) -> Vec<Concept> {
        let targets: HashSet<usize> = names.iter().filter_map(|n| self.resolve_name(n)).collect();
        if targets.is_empty() {
            return Vec::new();
        }

        // Multi-source BFS over prerequisite edges; first visit is the minimal distance.
        let mut distance: HashMap<usize, usize> = targets.iter().map(|&t| (t, 0)).collect();
        let mut queue: VecDeque<usize> = targets.iter().copied().collect();
        while let Some(current) = queue.pop_front() {
            let next = distance[&current] + 1;
            for prereq in &self.nodes[current].prerequisites {
                let Some(&idx) = self.by_id.get(prereq) else {
                    continue;
                };
                if !distance.contains_key(&idx) {
                    distance.insert(idx, next);
                    queue.push_back(idx);
                }
            }
        }

        let mut prerequisites: Vec<(usize, usize)> = distance
            .iter()
            .filter(|&(idx, _)| !targets.contains(idx))
            .map(|(&idx, &d)| (idx, d))
            .collect();
        prerequisites.sort_by(|a, b| {
            a.1.cmp(&b.1)
                .then_with(|| self.nodes[a.0].name.cmp(&self.nodes[b.0].name))
        });

        let mut target_list: Vec<usize> = targets.into_iter().collect();
        target_list.sort_by(|a, b| self.nodes[*a].name.cmp(&self.nodes[*b].name));

        prerequisites
            .into_iter()
            .map(|(idx, _)| self.concept(idx, ConceptRole::Prerequisite))
            .chain(
                target_list
                    .into_iter()
                    .map(|idx| self.concept(idx, ConceptRole::Target)),
            )
            .collect()
    }

    fn concept(&self, idx: usize, role: ConceptRole) -> Concept {
        let node = &self.nodes[idx];
        Concept {
            id: node.id.clone(),
            name: node.name.clone(),
            description: node.description.clone(),
            role,
        }
    }
}

#[async_trait]
impl ConceptGraph for FileConceptGraph {
    async fn resolve_prerequisite_path(&self, names: &[String]) -> Result<Vec<Concept>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let path = self.prerequisite_path(names);
        debug!(requested = names.len(), path_len = path.len(), "resolved prerequisite path");
        Ok(path)
    }
}
