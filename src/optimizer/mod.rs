//! # Plan Optimizer
//!
//! Rule-and-cost rewriting of plan trees, applied in a fixed order:
//!
//! 1. Filter pushdown: `Filter(Join(L, R), p)` -> `Join(Filter(L, p), R)`
//!    when `p` touches only columns of L (symmetric for R);
//!    `Filter(Project(c, cols), p)` -> `Project(Filter(c, p), cols)` when
//!    `p` touches only projected columns.
//! 2. Filter merging: `Filter(Filter(c, p2), p1)` -> `Filter(c, p1 && p2)`.
//! 3. Projection collapse: `Project(Project(c, inner), outer)` ->
//!    `Project(c, outer)` for matching distinct flags, plus elision of
//!    projections that keep the child's full schema in order.
//! 4. Join reordering: the build (left) side of every hash join should be
//!    the smaller input, so joins whose right side is estimated strictly
//!    smaller are swapped. Only equality predicates are swap-safe.
//!
//! Every pass is a pure tree-to-tree function; the input plan is never
//! mutated and stays executable, which before/after timing harnesses rely
//! on. The optimizer reads the catalog but never the data, and it never
//! fails: fragments it cannot improve are rebuilt unchanged.
//!
//! The cardinality model uses the catalog row counts at the leaves and
//! fixed selectivities above them (0.3 per comparison, 0.1 per equi-join,
//! `min(card, 10^|cols|)` for distinct projections, 1000 for tables the
//! catalog has never seen).

use tracing::debug;

use crate::catalog::Catalog;
use crate::plan::{JoinPredicate, PlanNode, Predicate};
use crate::value::Schema;

/// Fraction of rows assumed to pass one comparison.
pub const COMPARISON_SELECTIVITY: f64 = 0.3;
/// Fraction of the cross product assumed to survive an equi-join.
pub const EQUALITY_JOIN_SELECTIVITY: f64 = 0.1;
/// Cardinality assumed for tables the catalog has never seen.
pub const UNKNOWN_CARDINALITY: u64 = 1000;

/// Which rewrite passes run. All passes are on by default; the flags
/// exist for debugging and for before/after comparisons.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct OptimizerConfig {
    #[serde(default = "default_true")]
    pub enable_filter_pushdown: bool,
    #[serde(default = "default_true")]
    pub enable_filter_merge: bool,
    #[serde(default = "default_true")]
    pub enable_projection_collapse: bool,
    #[serde(default = "default_true")]
    pub enable_join_reorder: bool,
}

fn default_true() -> bool {
    true
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig {
            enable_filter_pushdown: true,
            enable_filter_merge: true,
            enable_projection_collapse: true,
            enable_join_reorder: true,
        }
    }
}

/// Estimated number of rows a subplan produces.
pub fn estimate_cardinality(plan: &PlanNode, catalog: &Catalog) -> u64 {
    match plan {
        PlanNode::Scan { path, .. } => catalog.row_count(path).unwrap_or(UNKNOWN_CARDINALITY),
        PlanNode::Filter { input, predicate } => {
            let input_card = estimate_cardinality(input, catalog) as f64;
            (input_card * selectivity(predicate)).round() as u64
        }
        PlanNode::Join {
            left,
            right,
            predicate,
        } => {
            let left_card = estimate_cardinality(left, catalog) as f64;
            let right_card = estimate_cardinality(right, catalog) as f64;
            (left_card * right_card * join_selectivity(predicate)).round() as u64
        }
        PlanNode::Project {
            input,
            columns,
            distinct,
        } => {
            let input_card = estimate_cardinality(input, catalog);
            if *distinct {
                input_card.min(distinct_cap(columns.len()))
            } else {
                input_card
            }
        }
        PlanNode::Sink { input, .. } => estimate_cardinality(input, catalog),
    }
}

/// Fraction of rows a predicate is expected to pass: 0.3 per comparison,
/// conjunctions multiply under the independence assumption.
fn selectivity(predicate: &Predicate) -> f64 {
    match predicate {
        Predicate::Compare { .. } => COMPARISON_SELECTIVITY,
        Predicate::And(lhs, rhs) => selectivity(lhs) * selectivity(rhs),
    }
}

fn join_selectivity(predicate: &JoinPredicate) -> f64 {
    match predicate {
        JoinPredicate::Equality { .. } => EQUALITY_JOIN_SELECTIVITY,
    }
}

/// A distinct projection over n columns emits at most 10^n rows under the
/// model's default of 10 distinct values per column.
fn distinct_cap(column_count: usize) -> u64 {
    u32::try_from(column_count)
        .ok()
        .and_then(|n| 10u64.checked_pow(n))
        .unwrap_or(u64::MAX)
}

/// The plan rewriter. Holds only pass toggles; all methods are pure.
#[derive(Debug, Clone, Default)]
pub struct Optimizer {
    config: OptimizerConfig,
}

impl Optimizer {
    pub fn new() -> Self {
        Optimizer {
            config: OptimizerConfig::default(),
        }
    }

    pub fn with_config(config: OptimizerConfig) -> Self {
        Optimizer { config }
    }

    /// Rewrite a plan into an equivalent, cheaper plan. The original is
    /// left untouched.
    pub fn optimize(&self, plan: &PlanNode, catalog: &Catalog) -> PlanNode {
        let mut plan = plan.clone();
        if self.config.enable_filter_pushdown {
            plan = self.pushdown_filters(plan);
        }
        if self.config.enable_filter_merge {
            plan = self.merge_filters(plan);
        }
        if self.config.enable_projection_collapse {
            plan = self.collapse_projections(plan);
        }
        if self.config.enable_join_reorder {
            plan = self.reorder_joins(plan, catalog);
        }
        plan
    }

    /// Rule: move filters beneath joins and projections, top-down.
    ///
    /// A pushed filter is re-examined at its new position, so a predicate
    /// can sink through several levels in one pass.
    fn pushdown_filters(&self, plan: PlanNode) -> PlanNode {
        match plan {
            PlanNode::Filter { input, predicate } => match *input {
                PlanNode::Join {
                    left,
                    right,
                    predicate: join_predicate,
                } => {
                    let left_schema = left.output_schema();
                    let right_schema = right.output_schema();
                    let scope = left_schema.concat(&right_schema);

                    if references_only(&predicate, &left_schema, &scope) {
                        debug!(predicate = %predicate, side = "left", "pushed filter below join");
                        self.pushdown_filters(PlanNode::Join {
                            left: Box::new(PlanNode::Filter {
                                input: left,
                                predicate,
                            }),
                            right,
                            predicate: join_predicate,
                        })
                    } else if references_only(&predicate, &right_schema, &scope) {
                        debug!(predicate = %predicate, side = "right", "pushed filter below join");
                        self.pushdown_filters(PlanNode::Join {
                            left,
                            right: Box::new(PlanNode::Filter {
                                input: right,
                                predicate,
                            }),
                            predicate: join_predicate,
                        })
                    } else {
                        PlanNode::Filter {
                            input: Box::new(self.pushdown_filters(PlanNode::Join {
                                left,
                                right,
                                predicate: join_predicate,
                            })),
                            predicate,
                        }
                    }
                }
                PlanNode::Project {
                    input: child,
                    columns,
                    distinct,
                } => {
                    if pushable_through_projection(&predicate, &columns, &child.output_schema()) {
                        debug!(predicate = %predicate, "pushed filter below projection");
                        self.pushdown_filters(PlanNode::Project {
                            input: Box::new(PlanNode::Filter {
                                input: child,
                                predicate,
                            }),
                            columns,
                            distinct,
                        })
                    } else {
                        PlanNode::Filter {
                            input: Box::new(self.pushdown_filters(PlanNode::Project {
                                input: child,
                                columns,
                                distinct,
                            })),
                            predicate,
                        }
                    }
                }
                other => PlanNode::Filter {
                    input: Box::new(self.pushdown_filters(other)),
                    predicate,
                },
            },
            PlanNode::Project {
                input,
                columns,
                distinct,
            } => PlanNode::Project {
                input: Box::new(self.pushdown_filters(*input)),
                columns,
                distinct,
            },
            PlanNode::Join {
                left,
                right,
                predicate,
            } => PlanNode::Join {
                left: Box::new(self.pushdown_filters(*left)),
                right: Box::new(self.pushdown_filters(*right)),
                predicate,
            },
            PlanNode::Sink { input, path } => PlanNode::Sink {
                input: Box::new(self.pushdown_filters(*input)),
                path,
            },
            scan @ PlanNode::Scan { .. } => scan,
        }
    }

    /// Rule: collapse stacked filters into one conjunction, the upper
    /// predicate as the left conjunct. Applying the pass twice yields the
    /// same tree as applying it once.
    fn merge_filters(&self, plan: PlanNode) -> PlanNode {
        match plan {
            PlanNode::Filter { input, predicate } => match *input {
                PlanNode::Filter {
                    input: inner_input,
                    predicate: inner_predicate,
                } => {
                    debug!(outer = %predicate, inner = %inner_predicate, "merged stacked filters");
                    self.merge_filters(PlanNode::Filter {
                        input: inner_input,
                        predicate: Predicate::and(predicate, inner_predicate),
                    })
                }
                other => PlanNode::Filter {
                    input: Box::new(self.merge_filters(other)),
                    predicate,
                },
            },
            PlanNode::Project {
                input,
                columns,
                distinct,
            } => PlanNode::Project {
                input: Box::new(self.merge_filters(*input)),
                columns,
                distinct,
            },
            PlanNode::Join {
                left,
                right,
                predicate,
            } => PlanNode::Join {
                left: Box::new(self.merge_filters(*left)),
                right: Box::new(self.merge_filters(*right)),
                predicate,
            },
            PlanNode::Sink { input, path } => PlanNode::Sink {
                input: Box::new(self.merge_filters(*input)),
                path,
            },
            scan @ PlanNode::Scan { .. } => scan,
        }
    }

    /// Rule: collapse stacked projections with the same distinct flag and
    /// elide projections that keep the child's full schema in order.
    ///
    /// Both projections address columns by their source names (there is
    /// no renaming), so the inner column mapping is the identity and the
    /// outer list survives the collapse verbatim. The collapse is skipped
    /// when the outer list names a column the inner projection dropped:
    /// that column is null through the inner projection and must stay
    /// null.
    fn collapse_projections(&self, plan: PlanNode) -> PlanNode {
        match plan {
            PlanNode::Project {
                input,
                columns,
                distinct,
            } => {
                let input = self.collapse_projections(*input);

                if let PlanNode::Project {
                    input: inner_input,
                    columns: inner_columns,
                    distinct: inner_distinct,
                } = &input
                {
                    if *inner_distinct == distinct
                        && columns.iter().all(|c| inner_columns.contains(c))
                    {
                        debug!(outer = ?columns, inner = ?inner_columns, "collapsed projections");
                        return self.collapse_projections(PlanNode::Project {
                            input: inner_input.clone(),
                            columns,
                            distinct,
                        });
                    }
                }

                // Elide a projection that changes nothing.
                if !distinct {
                    let child_schema = input.output_schema();
                    let child_names: Vec<&str> = child_schema.field_names().collect();
                    if child_names == columns.iter().map(String::as_str).collect::<Vec<_>>() {
                        debug!(columns = ?columns, "elided identity projection");
                        return input;
                    }
                }

                PlanNode::Project {
                    input: Box::new(input),
                    columns,
                    distinct,
                }
            }
            PlanNode::Filter { input, predicate } => PlanNode::Filter {
                input: Box::new(self.collapse_projections(*input)),
                predicate,
            },
            PlanNode::Join {
                left,
                right,
                predicate,
            } => PlanNode::Join {
                left: Box::new(self.collapse_projections(*left)),
                right: Box::new(self.collapse_projections(*right)),
                predicate,
            },
            PlanNode::Sink { input, path } => PlanNode::Sink {
                input: Box::new(self.collapse_projections(*input)),
                path,
            },
            scan @ PlanNode::Scan { .. } => scan,
        }
    }

    /// Rule: make the smaller input the build side of every hash join,
    /// bottom-up. Children are optimized before their parent's sides are
    /// costed, so the estimates reflect pushed-down filters.
    fn reorder_joins(&self, plan: PlanNode, catalog: &Catalog) -> PlanNode {
        match plan {
            PlanNode::Join {
                left,
                right,
                predicate,
            } => {
                let left = self.reorder_joins(*left, catalog);
                let right = self.reorder_joins(*right, catalog);
                let left_card = estimate_cardinality(&left, catalog);
                let right_card = estimate_cardinality(&right, catalog);

                if right_card < left_card && predicate.is_swappable() {
                    debug!(
                        left_card,
                        right_card,
                        predicate = %predicate,
                        "swapped join sides to shrink the build table"
                    );
                    PlanNode::Join {
                        left: Box::new(right),
                        right: Box::new(left),
                        predicate: predicate.swapped(),
                    }
                } else {
                    PlanNode::Join {
                        left: Box::new(left),
                        right: Box::new(right),
                        predicate,
                    }
                }
            }
            PlanNode::Filter { input, predicate } => PlanNode::Filter {
                input: Box::new(self.reorder_joins(*input, catalog)),
                predicate,
            },
            PlanNode::Project {
                input,
                columns,
                distinct,
            } => PlanNode::Project {
                input: Box::new(self.reorder_joins(*input, catalog)),
                columns,
                distinct,
            },
            PlanNode::Sink { input, path } => PlanNode::Sink {
                input: Box::new(self.reorder_joins(*input, catalog)),
                path,
            },
            scan @ PlanNode::Scan { .. } => scan,
        }
    }
}

/// True when every identifier of `predicate` that is an attribute in
/// `scope` belongs to `side`. Identifiers outside the scope are string
/// literals and constrain nothing.
fn references_only(predicate: &Predicate, side: &Schema, scope: &Schema) -> bool {
    predicate
        .idents()
        .iter()
        .all(|ident| !scope.contains(ident) || side.contains(ident))
}

/// True when the predicate means the same thing above and below the
/// projection: every identifier that is a column on either side of the
/// projection must be a column on both. An identifier the projection
/// dropped would see a real value below but null above; one the
/// projection invented (an unknown name, null at runtime) would turn into
/// a string literal below.
fn pushable_through_projection(
    predicate: &Predicate,
    columns: &[String],
    child_schema: &Schema,
) -> bool {
    predicate.idents().iter().all(|ident| {
        let in_child = child_schema.contains(ident);
        let in_projection = columns.iter().any(|c| c == ident);
        in_child == in_projection
    })
}
