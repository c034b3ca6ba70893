//! Graphviz rendering of the alpha and beta networks.
//!
//! The output is a `digraph` with the beta DAG in one cluster, the alpha
//! tree in another, and cross edges from alpha memories to their beta
//! successors, suitable for `dot -Tsvg`.

use crate::beta_network::BetaKind;
use crate::rete_network::Network;
use crate::types::{NodeId, TestNodeId};

impl Network {
    /// Render the current network topology as a Graphviz document.
    pub fn to_dot(&self) -> String {
        let mut out = String::new();
        out.push_str("digraph {\n");
        out.push_str("    subgraph cluster_1 {\n");
        out.push_str("    label = beta\n");
        self.dot_beta(self.beta_root, &mut out);
        out.push_str("    }\n");
        out.push_str("    subgraph cluster_0 {\n");
        out.push_str("    label = alpha\n");
        self.dot_alpha(self.alpha_root, &mut out);
        out.push_str("    }\n");
        self.dot_alpha_to_beta(self.alpha_root, &mut out);
        out.push_str("}\n");
        out
    }

    fn beta_label(&self, node: NodeId) -> String {
        format!("{} {}", self.beta(node).kind.tag().node_name(), node)
    }

    fn test_label(&self, node: TestNodeId) -> String {
        match &self.test_node(node).test {
            None => "no-test".to_string(),
            Some((field, symbol)) => format!("{field}=={symbol}?"),
        }
    }

    fn dot_beta(&self, node: NodeId, out: &mut String) {
        if let BetaKind::NccPartner { ncc, .. } = self.beta(node).kind {
            out.push_str(&format!(
                "    \"{}\" -> \"{}\";\n",
                self.beta_label(node),
                self.beta_label(ncc)
            ));
        }
        for &child in &self.beta(node).children {
            out.push_str(&format!(
                "    \"{}\" -> \"{}\";\n",
                self.beta_label(node),
                self.beta_label(child)
            ));
            self.dot_beta(child, out);
        }
    }

    fn dot_alpha(&self, node: TestNodeId, out: &mut String) {
        for &child in &self.test_node(node).children {
            out.push_str(&format!(
                "    \"{}\" -> \"{}\";\n",
                self.test_label(node),
                self.test_label(child)
            ));
            self.dot_alpha(child, out);
        }
    }

    fn dot_alpha_to_beta(&self, node: TestNodeId, out: &mut String) {
        if let Some(memory) = self.test_node(node).memory {
            for &successor in &self.alpha_memory(memory).successors {
                out.push_str(&format!(
                    "    \"{}\" -> \"{}\";\n",
                    self.test_label(node),
                    self.beta_label(successor)
                ));
            }
        }
        for &child in &self.test_node(node).children {
            self.dot_alpha_to_beta(child, out);
        }
    }
}
