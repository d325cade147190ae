//! Gradient-Boosted Tree Ensemble Evaluation
//!
//! Scores a pre-trained regression ensemble against one feature vector.
//! Nothing here trains; the ensembles arrive as columnar JSON dumps and are
//! evaluated in pure Rust.
//!
//! Split semantics follow the trainer exactly:
//!     value <  threshold  -> left
//!     value >= threshold  -> right
//!     value missing (NaN) -> node's default branch
//!
//! Thresholds are stored as `f32` and every feature value is narrowed to
//! `f32` before the comparison, as the trainer does. A value just below a
//! threshold in `f64` can round onto it and go right.
//!
//! The score is the sum of every tree's leaf value plus the base score.

use serde::{Deserialize, Serialize};

use crate::error::{PredictionError, Result};

/// Child index marking a leaf
pub const LEAF_SENTINEL: i32 = -1;

/// One node of a regression tree in arena form.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    pub left_child: i32,
    pub right_child: i32,
    pub split_feature: usize,
    pub threshold: f32,
    pub leaf_value: f64,
    /// Branch taken when the split feature is missing
    pub default_left: bool,
}

impl TreeNode {
    pub fn is_leaf(&self) -> bool {
        self.left_child == LEAF_SENTINEL
    }
}

/// Column-per-attribute tree layout as written by the trainer.
///
/// For leaves, `split_conditions` holds the leaf value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TreeColumns {
    pub left_children: Vec<i32>,
    pub right_children: Vec<i32>,
    pub split_indices: Vec<i64>,
    pub split_conditions: Vec<f64>,
    #[serde(deserialize_with = "deserialize_flags")]
    pub default_left: Vec<bool>,
}

/// Accept `default_left` as booleans or 0/1 integers.
fn deserialize_flags<'de, D>(deserializer: D) -> std::result::Result<Vec<bool>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    let raw = Vec::<Flag>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|f| match f {
            Flag::Bool(b) => b,
            Flag::Int(i) => i != 0,
        })
        .collect())
}

/// A single regression tree; node 0 is the root.
#[derive(Debug, Clone, PartialEq)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
}

impl RegressionTree {
    /// Build a tree from its columns, checking every structural invariant.
    ///
    /// Children must point forward (higher index than the parent), which
    /// guarantees traversal terminates.
    pub fn from_columns(columns: &TreeColumns, num_features: usize) -> std::result::Result<Self, String> {
        let n = columns.left_children.len();
        if n == 0 {
            return Err("tree has no nodes".into());
        }
        if columns.right_children.len() != n
            || columns.split_indices.len() != n
            || columns.split_conditions.len() != n
            || columns.default_left.len() != n
        {
            return Err("inconsistent column lengths".into());
        }

        let mut nodes = Vec::with_capacity(n);
        for i in 0..n {
            let left = columns.left_children[i];
            let right = columns.right_children[i];
            let is_leaf = left == LEAF_SENTINEL;

            if is_leaf != (right == LEAF_SENTINEL) {
                return Err(format!("node {} has exactly one child", i));
            }

            let split_feature = if is_leaf {
                0
            } else {
                for child in [left, right] {
                    if child <= i as i32 || child as usize >= n {
                        return Err(format!("node {} has invalid child index {}", i, child));
                    }
                }
                let feature = columns.split_indices[i];
                if feature < 0 || feature as usize >= num_features {
                    return Err(format!(
                        "node {} splits on feature {} but the model declares {} features",
                        i, feature, num_features
                    ));
                }
                feature as usize
            };

            let condition = columns.split_conditions[i];
            nodes.push(TreeNode {
                left_child: left,
                right_child: right,
                split_feature,
                threshold: if is_leaf { 0.0 } else { condition as f32 },
                leaf_value: if is_leaf { condition } else { 0.0 },
                default_left: columns.default_left[i],
            });
        }

        Ok(Self { nodes })
    }

    /// Walk from the root to a leaf and return its value.
    pub fn leaf_value(&self, features: &[f64]) -> f64 {
        let mut idx = 0usize;
        loop {
            let node = &self.nodes[idx];
            if node.is_leaf() {
                return node.leaf_value;
            }
            let go_left = match features.get(node.split_feature) {
                Some(v) if !v.is_nan() => (*v as f32) < node.threshold,
                _ => node.default_left,
            };
            idx = if go_left {
                node.left_child as usize
            } else {
                node.right_child as usize
            };
        }
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_at(&self, index: usize) -> Option<&TreeNode> {
        self.nodes.get(index)
    }

    /// Longest root-to-leaf path, computed without recursion.
    pub fn depth(&self) -> usize {
        let mut depths = vec![0usize; self.nodes.len()];
        let mut max_depth = 0;
        for (i, node) in self.nodes.iter().enumerate() {
            if node.is_leaf() {
                max_depth = max_depth.max(depths[i]);
            } else {
                depths[node.left_child as usize] = depths[i] + 1;
                depths[node.right_child as usize] = depths[i] + 1;
            }
        }
        max_depth
    }
}

/// Parse a base score such as `"[2.2853E3]"` or `"5E-1"`.
pub fn parse_base_score(raw: &str) -> Option<f64> {
    let trimmed = raw.trim().trim_start_matches('[').trim_end_matches(']').trim();
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Number(f64),
}

impl Scalar {
    fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Text(s) => parse_base_score(s),
            Scalar::Number(n) => Some(*n),
        }
    }
}

#[derive(Deserialize)]
struct ModelFile {
    learner: Learner,
}

#[derive(Deserialize)]
struct Learner {
    #[serde(default)]
    feature_names: Vec<String>,
    learner_model_param: LearnerModelParam,
    gradient_booster: GradientBooster,
}

#[derive(Deserialize)]
struct LearnerModelParam {
    base_score: Scalar,
    num_feature: Scalar,
}

#[derive(Deserialize)]
struct GradientBooster {
    model: BoosterModel,
}

#[derive(Deserialize)]
struct BoosterModel {
    trees: Vec<TreeColumns>,
}

/// A loaded tree ensemble
#[derive(Debug, Clone, PartialEq)]
pub struct TreeEnsemble {
    name: String,
    trees: Vec<RegressionTree>,
    base_score: f64,
    num_features: usize,
    feature_names: Vec<String>,
}

impl TreeEnsemble {
    pub fn new(
        name: impl Into<String>,
        trees: Vec<RegressionTree>,
        base_score: f64,
        num_features: usize,
        feature_names: Vec<String>,
    ) -> Result<Self> {
        let name = name.into();
        if !feature_names.is_empty() && feature_names.len() != num_features {
            return Err(PredictionError::InvalidModel {
                name,
                reason: format!(
                    "declares {} features but names {}",
                    num_features,
                    feature_names.len()
                ),
            });
        }
        Ok(Self {
            name,
            trees,
            base_score,
            num_features,
            feature_names,
        })
    }

    /// Parse the trainer's JSON dump.
    pub fn from_json(name: &str, bytes: &[u8]) -> Result<Self> {
        let file: ModelFile =
            serde_json::from_slice(bytes).map_err(|source| PredictionError::ArtifactParse {
                name: name.to_string(),
                source,
            })?;
        let learner = file.learner;
        let invalid = |reason: String| PredictionError::InvalidModel {
            name: name.to_string(),
            reason,
        };

        let base_score = learner
            .learner_model_param
            .base_score
            .as_f64()
            .ok_or_else(|| invalid("unparseable base_score".to_string()))?;
        let num_features = learner
            .learner_model_param
            .num_feature
            .as_f64()
            .filter(|n| *n >= 1.0 && n.fract() == 0.0)
            .ok_or_else(|| invalid("num_feature must be a positive integer".to_string()))?
            as usize;

        let trees = learner
            .gradient_booster
            .model
            .trees
            .iter()
            .enumerate()
            .map(|(i, columns)| {
                RegressionTree::from_columns(columns, num_features)
                    .map_err(|e| invalid(format!("tree {}: {}", i, e)))
            })
            .collect::<Result<Vec<_>>>()?;

        Self::new(name, trees, base_score, num_features, learner.feature_names)
    }

    /// Score one feature vector.
    pub fn evaluate(&self, features: &[f64]) -> f64 {
        let leaves: f64 = self.trees.iter().map(|t| t.leaf_value(features)).sum();
        leaves + self.base_score
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn base_score(&self) -> f64 {
        self.base_score
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    /// Feature names in model order; empty when the dump carries none.
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn max_depth(&self) -> usize {
        self.trees.iter().map(RegressionTree::depth).max().unwrap_or(0)
    }
}
