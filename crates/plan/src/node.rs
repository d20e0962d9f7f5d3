//! Logical plan tree
//!
//! A plan is an owned tree of [`PlanNode`]s. Nodes are never mutated in
//! place by the rewriter: passes consume a tree and return a rebuilt one,
//! reusing the ids of nodes they keep so deferred instructions can still
//! find their targets.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tessera_core::{CollectedIdentifiers, EntityRef, QueryRequest, Value, Version};

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a plan node within the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    fn fresh() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kind of write a modify node performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifyOperation {
    /// Insert the input rows
    Insert,
    /// Update the input rows in place
    Update,
    /// Delete the input rows
    Delete,
}

/// Statement kind of a whole plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// Read-only query
    Select,
    /// INSERT
    Insert,
    /// UPDATE
    Update,
    /// DELETE
    Delete,
}

/// Binary operators in expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `AND`
    And,
    /// `OR`
    Or,
    /// `+`
    Add,
    /// `-`
    Sub,
}

/// Scalar expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Reference to an input field
    Field(String),
    /// Constant
    Literal(Value),
    /// Arithmetic negation
    Negate(Box<Expr>),
    /// Binary operation
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        left: Box<Expr>,
        /// Right operand
        right: Box<Expr>,
    },
}

impl Expr {
    /// Field reference
    pub fn field(name: impl Into<String>) -> Self {
        Expr::Field(name.into())
    }

    /// Literal value
    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    /// Binary operation
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Names of every field referenced
    pub fn fields(&self) -> Vec<&str> {
        match self {
            Expr::Field(name) => vec![name.as_str()],
            Expr::Literal(_) => Vec::new(),
            Expr::Negate(inner) => inner.fields(),
            Expr::Binary { left, right, .. } => {
                let mut fields = left.fields();
                fields.extend(right.fields());
                fields
            }
        }
    }
}

/// Operator of a plan node
#[derive(Debug, Clone)]
pub enum Operator {
    /// Full scan of an entity
    Scan {
        /// Scanned entity
        entity: EntityRef,
    },
    /// Literal relational rows
    Values {
        /// Column names
        fields: Vec<String>,
        /// Rows in column order
        rows: Vec<Vec<Value>>,
    },
    /// Literal documents
    Documents {
        /// One `Value::Document` per document
        documents: Vec<Value>,
    },
    /// Literal graph elements
    GraphValues {
        /// Node property documents
        nodes: Vec<Value>,
        /// Edge property documents
        edges: Vec<Value>,
    },
    /// Keep rows matching a predicate
    Filter {
        /// Predicate
        condition: Expr,
    },
    /// Compute exactly these output fields
    Project {
        /// Output name and expression
        exprs: Vec<(String, Expr)>,
    },
    /// Keep every input field, overwriting or adding the assigned ones
    Extend {
        /// Field name and expression
        assignments: Vec<(String, Expr)>,
    },
    /// Grouping
    Aggregate {
        /// Grouping fields
        group_by: Vec<String>,
        /// Output name and aggregate expression
        aggregates: Vec<(String, Expr)>,
    },
    /// Ordering
    Sort {
        /// Field and ascending flag
        keys: Vec<(String, bool)>,
    },
    /// Join of two inputs
    Join {
        /// Join predicate
        condition: Expr,
    },
    /// Union of all inputs
    Union {
        /// Keep duplicates
        all: bool,
    },
    /// Graph pattern match
    Match {
        /// Pattern text
        pattern: String,
    },
    /// Write of the input rows into an entity
    Modify {
        /// Target entity
        entity: EntityRef,
        /// Write kind
        operation: ModifyOperation,
        /// Assignments of an UPDATE
        updates: Vec<(String, Expr)>,
    },
    /// Records every `_eid` flowing through into `sink`
    IdentifierCollector {
        /// Entity the identities belong to
        entity: EntityRef,
        /// Shared sink read back at commit
        sink: CollectedIdentifiers,
    },
    /// Allocates `_eid` and stamps `_vid` on every row at execution time
    AssignIdentifiers {
        /// Entity the identities are allocated for
        entity: EntityRef,
        /// Version stamped on every row
        version: Version,
        /// Receives every allocated identity
        sink: CollectedIdentifiers,
    },
    /// Removes the rows of `entity` stamped with `version` whose `|_eid|`
    /// the input carries, then passes the input on to be written
    ///
    /// Keeps one row per identity and writer when a transaction writes the
    /// same record twice.
    SupersedeOwnVersions {
        /// Entity the rows belong to
        entity: EntityRef,
        /// Provisional version of the writing transaction
        version: Version,
    },
    /// Statement already planned by the query-processing collaborator
    Native {
        /// The planned statement
        request: QueryRequest,
    },
}

impl Operator {
    /// Short operator name for logs and plan dumps
    pub fn name(&self) -> &'static str {
        match self {
            Operator::Scan { .. } => "Scan",
            Operator::Values { .. } => "Values",
            Operator::Documents { .. } => "Documents",
            Operator::GraphValues { .. } => "GraphValues",
            Operator::Filter { .. } => "Filter",
            Operator::Project { .. } => "Project",
            Operator::Extend { .. } => "Extend",
            Operator::Aggregate { .. } => "Aggregate",
            Operator::Sort { .. } => "Sort",
            Operator::Join { .. } => "Join",
            Operator::Union { .. } => "Union",
            Operator::Match { .. } => "Match",
            Operator::Modify { .. } => "Modify",
            Operator::IdentifierCollector { .. } => "IdentifierCollector",
            Operator::AssignIdentifiers { .. } => "AssignIdentifiers",
            Operator::SupersedeOwnVersions { .. } => "SupersedeOwnVersions",
            Operator::Native { .. } => "Native",
        }
    }
}

/// A node and its inputs
#[derive(Debug, Clone)]
pub struct PlanNode {
    id: NodeId,
    op: Operator,
    inputs: Vec<PlanNode>,
}

impl PlanNode {
    /// Create a node with a fresh id
    pub fn new(op: Operator, inputs: Vec<PlanNode>) -> Self {
        PlanNode {
            id: NodeId::fresh(),
            op,
            inputs,
        }
    }

    /// Create a node without inputs
    pub fn leaf(op: Operator) -> Self {
        PlanNode::new(op, Vec::new())
    }

    /// Create a node with a single input
    pub fn unary(op: Operator, input: PlanNode) -> Self {
        PlanNode::new(op, vec![input])
    }

    /// Scan of `entity`
    pub fn scan(entity: EntityRef) -> Self {
        PlanNode::leaf(Operator::Scan { entity })
    }

    /// Node id
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Operator
    pub fn op(&self) -> &Operator {
        &self.op
    }

    /// Inputs
    pub fn inputs(&self) -> &[PlanNode] {
        &self.inputs
    }

    /// Split into id, operator and inputs
    pub fn into_parts(self) -> (NodeId, Operator, Vec<PlanNode>) {
        (self.id, self.op, self.inputs)
    }

    /// Rebuild a node that keeps its id
    pub fn from_parts(id: NodeId, op: Operator, inputs: Vec<PlanNode>) -> Self {
        PlanNode { id, op, inputs }
    }

    /// Same node with other inputs
    pub fn with_inputs(self, inputs: Vec<PlanNode>) -> Self {
        PlanNode { inputs, ..self }
    }

    /// Depth-first pre-order iteration
    pub fn walk(&self) -> Vec<&PlanNode> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(node.inputs.iter().rev());
        }
        out
    }

    /// First node matching `predicate`, depth-first
    pub fn find(&self, predicate: impl Fn(&PlanNode) -> bool) -> Option<&PlanNode> {
        self.walk().into_iter().find(|node| predicate(node))
    }

    fn explain_into(&self, depth: usize, out: &mut String) {
        out.push_str(&"  ".repeat(depth));
        out.push_str(self.op.name());
        match &self.op {
            Operator::Scan { entity } => out.push_str(&format!("({})", entity)),
            Operator::Modify { entity, operation, .. } => {
                out.push_str(&format!("({:?} {})", operation, entity))
            }
            Operator::IdentifierCollector { entity, .. } => out.push_str(&format!("({})", entity)),
            Operator::AssignIdentifiers { entity, version, .. }
            | Operator::SupersedeOwnVersions { entity, version } => {
                out.push_str(&format!("({} {})", entity, version))
            }
            _ => {}
        }
        out.push('\n');
        for input in &self.inputs {
            input.explain_into(depth + 1, out);
        }
    }

    /// Indented operator tree
    pub fn explain(&self) -> String {
        let mut out = String::new();
        self.explain_into(0, &mut out);
        out
    }
}

/// Root of a statement plan
#[derive(Debug, Clone)]
pub struct PlanRoot {
    /// Plan tree
    pub node: PlanNode,
    /// Statement kind
    pub kind: StatementKind,
}

impl PlanRoot {
    /// Create a root
    pub fn new(node: PlanNode, kind: StatementKind) -> Self {
        PlanRoot { node, kind }
    }

    /// Same root over another tree
    pub fn with_node(self, node: PlanNode) -> Self {
        PlanRoot { node, ..self }
    }

    /// Same root with another kind
    pub fn with_kind(self, kind: StatementKind) -> Self {
        PlanRoot { kind, ..self }
    }
}
