//! The tool handed to every `canonical` call.

use crate::ir::nodes::CanonicalizerTool;

/// Canonicalizer tool for whole-graph runs.
#[derive(Debug, Clone, Copy)]
pub struct GraphCanonicalizerTool {
    all_usages_available: bool,
}

impl GraphCanonicalizerTool {
    /// A tool for a graph whose usages are all present.
    pub fn new() -> Self {
        GraphCanonicalizerTool {
            all_usages_available: true,
        }
    }

    /// A tool for a graph that is still under construction, where usages
    /// may be missing.
    pub fn partial() -> Self {
        GraphCanonicalizerTool {
            all_usages_available: false,
        }
    }
}

impl Default for GraphCanonicalizerTool {
    fn default() -> Self {
        Self::new()
    }
}

impl CanonicalizerTool for GraphCanonicalizerTool {
    fn all_usages_available(&self) -> bool {
        self.all_usages_available
    }
}
