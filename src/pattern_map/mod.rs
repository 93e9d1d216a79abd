//! Trie keyed by pattern tokens.
//!
//! Nodes live in an arena (`Vec<Node<V>>`) addressed by stable integer ids:
//! no `Rc`/`Weak` back-edges. `delete` walks the same token path `set` used
//! to reach a node, so no back-edges are needed to prune empty nodes either.
//!
//! Edge classification is represented as three node fields instead of a
//! generic `HashMap<EdgeKey, NodeId>`: `literal` children are looked up by
//! name, `segment_wildcard` and `terminal_wildcard` are each a single
//! optional edge.

use crate::pattern::{Pattern, Token};
use percent_encoding::percent_decode_str;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternMapError {
    #[error("a segment-wildcard edge already exists at this node; no literal sibling may be added")]
    SegmentWildcardSibling,
    #[error("a literal edge already exists at this node; no segment-wildcard sibling may be added")]
    LiteralSibling,
    #[error("a terminal-wildcard edge already exists at this node; no sibling edges may be added")]
    TerminalWildcardPresent,
    #[error("other edges already exist at this node; a terminal-wildcard edge cannot be added")]
    OtherEdgesPresent,
}

type NodeId = usize;

struct Node<V> {
    value: Option<V>,
    literal_children: HashMap<String, NodeId>,
    segment_wildcard: Option<NodeId>,
    terminal_wildcard: Option<NodeId>,
}

impl<V> Node<V> {
    fn empty() -> Self {
        Self {
            value: None,
            literal_children: HashMap::new(),
            segment_wildcard: None,
            terminal_wildcard: None,
        }
    }

    fn is_empty(&self) -> bool {
        self.value.is_none()
            && self.literal_children.is_empty()
            && self.segment_wildcard.is_none()
            && self.terminal_wildcard.is_none()
    }
}

/// A prefix tree mapping [`Pattern`]s to values of type `V`.
///
/// `case_sensitive` governs literal-edge comparison uniformly for every
/// pattern inserted — callers are expected to construct all their patterns
/// with the same case-sensitivity flag as the map itself.
pub struct PatternMap<V> {
    nodes: Vec<Node<V>>,
    case_sensitive: bool,
}

const ROOT: NodeId = 0;

impl<V> PatternMap<V> {
    pub fn new(case_sensitive: bool) -> Self {
        Self {
            nodes: vec![Node::empty()],
            case_sensitive,
        }
    }

    /// Insert `value` at the node reached by `pattern`'s token path, applying
    /// the uniqueness rule at every node along the way. Returns the
    /// previously stored value, if any, when re-inserting at the same node
    /// (i.e. an equal pattern).
    pub fn set(&mut self, pattern: &Pattern, value: V) -> Result<Option<V>, PatternMapError> {
        let mut node_id = ROOT;
        for token in pattern.tokens() {
            node_id = match token {
                Token::Literal(lit) => self.descend_literal(node_id, lit)?,
                Token::Parameter(_) => self.descend_segment_wildcard(node_id)?,
                Token::Wildcard => self.descend_terminal_wildcard(node_id)?,
            };
        }
        Ok(self.nodes[node_id].value.replace(value))
    }

    /// Structural lookup keyed by a pattern's own token sequence — does not
    /// create nodes, and does not apply the path-lookup wildcard-preference
    /// rule (that is `lookup_path`'s job).
    pub fn get(&self, pattern: &Pattern) -> Option<&V> {
        let mut node_id = ROOT;
        for token in pattern.tokens() {
            node_id = match token {
                Token::Literal(lit) => {
                    let key = self.normalize(lit);
                    *self.nodes[node_id].literal_children.get(&key)?
                }
                Token::Parameter(_) => self.nodes[node_id].segment_wildcard?,
                Token::Wildcard => self.nodes[node_id].terminal_wildcard?,
            };
        }
        self.nodes[node_id].value.as_ref()
    }

    pub fn has(&self, pattern: &Pattern) -> bool {
        self.get(pattern).is_some()
    }

    /// Number of patterns currently holding a value (i.e. registered routes),
    /// not the number of trie nodes.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.value.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove the value reached by `pattern`'s token path, pruning any node
    /// that becomes empty as a result (except the root).
    pub fn delete(&mut self, pattern: &Pattern) -> Option<V> {
        let case_sensitive = self.case_sensitive;
        delete_rec(&mut self.nodes, ROOT, pattern.tokens(), 0, case_sensitive).0
    }

    /// Path-keyed lookup: `TERMINAL_WILDCARD`
    /// short-circuits to its subtree's value, and `SEGMENT_WILDCARD` is
    /// preferred over a literal sibling (which the uniqueness rule
    /// guarantees cannot coexist, so this is really "whichever edge kind is
    /// present wins"). The caller is responsible for separately calling
    /// `Pattern::extract` on the matched value's own pattern to bind
    /// parameters — `PatternMap` only locates the value.
    pub fn lookup_path(&self, path: &str) -> Option<&V> {
        let segments: Vec<String> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(decode_segment)
            .collect();
        self.lookup_rec(ROOT, &segments, 0)
    }

    fn lookup_rec(&self, node_id: NodeId, segments: &[String], idx: usize) -> Option<&V> {
        let node = &self.nodes[node_id];
        if idx == segments.len() {
            if node.value.is_some() {
                return node.value.as_ref();
            }
            return node
                .terminal_wildcard
                .and_then(|id| self.nodes[id].value.as_ref());
        }

        let seg = &segments[idx];
        if let Some(wc_id) = node.segment_wildcard {
            if let Some(v) = self.lookup_rec(wc_id, segments, idx + 1) {
                return Some(v);
            }
        } else {
            let key = self.normalize(seg);
            if let Some(&lit_id) = node.literal_children.get(&key) {
                if let Some(v) = self.lookup_rec(lit_id, segments, idx + 1) {
                    return Some(v);
                }
            }
        }

        node.terminal_wildcard
            .and_then(|id| self.nodes[id].value.as_ref())
    }

    fn normalize(&self, s: &str) -> String {
        if self.case_sensitive {
            s.to_string()
        } else {
            s.to_ascii_lowercase()
        }
    }

    fn descend_literal(&mut self, node_id: NodeId, lit: &str) -> Result<NodeId, PatternMapError> {
        let node = &self.nodes[node_id];
        if node.terminal_wildcard.is_some() {
            return Err(PatternMapError::TerminalWildcardPresent);
        }
        if node.segment_wildcard.is_some() {
            return Err(PatternMapError::SegmentWildcardSibling);
        }
        let key = self.normalize(lit);
        if let Some(&id) = self.nodes[node_id].literal_children.get(&key) {
            return Ok(id);
        }
        let new_id = self.nodes.len();
        self.nodes.push(Node::empty());
        self.nodes[node_id].literal_children.insert(key, new_id);
        Ok(new_id)
    }

    fn descend_segment_wildcard(&mut self, node_id: NodeId) -> Result<NodeId, PatternMapError> {
        let node = &self.nodes[node_id];
        if node.terminal_wildcard.is_some() {
            return Err(PatternMapError::TerminalWildcardPresent);
        }
        if !node.literal_children.is_empty() {
            return Err(PatternMapError::LiteralSibling);
        }
        if let Some(id) = node.segment_wildcard {
            return Ok(id);
        }
        let new_id = self.nodes.len();
        self.nodes.push(Node::empty());
        self.nodes[node_id].segment_wildcard = Some(new_id);
        Ok(new_id)
    }

    fn descend_terminal_wildcard(&mut self, node_id: NodeId) -> Result<NodeId, PatternMapError> {
        let node = &self.nodes[node_id];
        if node.segment_wildcard.is_some() || !node.literal_children.is_empty() {
            return Err(PatternMapError::OtherEdgesPresent);
        }
        if let Some(id) = node.terminal_wildcard {
            return Ok(id);
        }
        let new_id = self.nodes.len();
        self.nodes.push(Node::empty());
        self.nodes[node_id].terminal_wildcard = Some(new_id);
        Ok(new_id)
    }
}

/// Recursive delete + prune. Returns `(removed_value, node_is_now_empty)`.
fn delete_rec<V>(
    nodes: &mut Vec<Node<V>>,
    node_id: NodeId,
    tokens: &[Token],
    idx: usize,
    case_sensitive: bool,
) -> (Option<V>, bool) {
    if idx == tokens.len() {
        let removed = nodes[node_id].value.take();
        let empty = nodes[node_id].is_empty();
        return (removed, empty && node_id != ROOT);
    }

    match &tokens[idx] {
        Token::Literal(lit) => {
            let key = if case_sensitive {
                lit.clone()
            } else {
                lit.to_ascii_lowercase()
            };
            let child_id = match nodes[node_id].literal_children.get(&key) {
                Some(&id) => id,
                None => return (None, false),
            };
            let (removed, child_empty) =
                delete_rec(nodes, child_id, tokens, idx + 1, case_sensitive);
            if child_empty {
                nodes[node_id].literal_children.remove(&key);
            }
            (removed, nodes[node_id].is_empty() && node_id != ROOT)
        }
        Token::Parameter(_) => {
            let child_id = match nodes[node_id].segment_wildcard {
                Some(id) => id,
                None => return (None, false),
            };
            let (removed, child_empty) =
                delete_rec(nodes, child_id, tokens, idx + 1, case_sensitive);
            if child_empty {
                nodes[node_id].segment_wildcard = None;
            }
            (removed, nodes[node_id].is_empty() && node_id != ROOT)
        }
        Token::Wildcard => {
            let child_id = match nodes[node_id].terminal_wildcard {
                Some(id) => id,
                None => return (None, false),
            };
            let (removed, child_empty) =
                delete_rec(nodes, child_id, tokens, idx + 1, case_sensitive);
            if child_empty {
                nodes[node_id].terminal_wildcard = None;
            }
            (removed, nodes[node_id].is_empty() && node_id != ROOT)
        }
    }
}

fn decode_segment(seg: &str) -> String {
    percent_decode_str(seg)
        .decode_utf8()
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| seg.to_string())
}
