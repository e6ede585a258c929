//! Property tests: canonicalization of random straight-line graphs always
//! reaches a fixpoint, the pipeline leaves a well-formed graph, and neither
//! canonicalization nor lowering changes what the graph computes.

use keel_jit::config::CompilerConfig;
use keel_jit::ir::builder::GraphBuilder;
use keel_jit::ir::graph::Graph;
use keel_jit::ir::node::NodeId;
use keel_jit::ir::arith::ArithOp;
use keel_jit::ir::operators::{ControlOp, Operator};
use keel_jit::ir::stamp::{IntegerStamp, Stamp};
use keel_jit::opt::canonicalize::Canonicalizer;
use keel_jit::opt::lowering::ExactArithmeticLowering;
use proptest::prelude::*;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone)]
enum Step {
    Constant(i32),
    Negate(usize),
    Add(usize, usize),
    Sub(usize, usize),
    AddExact(usize, usize),
}

fn constant() -> impl Strategy<Value = i32> {
    prop_oneof![
        Just(0),
        Just(1),
        Just(-1),
        Just(i32::MAX),
        Just(i32::MIN),
        -8i32..8,
        any::<i32>(),
    ]
}

fn step() -> impl Strategy<Value = Step> {
    let index = any::<prop::sample::Index>();
    prop_oneof![
        constant().prop_map(Step::Constant),
        index.clone().prop_map(|i| Step::Negate(i.index(usize::MAX))),
        (index.clone(), index.clone())
            .prop_map(|(a, b)| Step::Add(a.index(usize::MAX), b.index(usize::MAX))),
        (index.clone(), index.clone())
            .prop_map(|(a, b)| Step::Sub(a.index(usize::MAX), b.index(usize::MAX))),
        (index.clone(), index)
            .prop_map(|(a, b)| Step::AddExact(a.index(usize::MAX), b.index(usize::MAX))),
    ]
}

fn parameter_stamp() -> impl Strategy<Value = IntegerStamp> {
    prop_oneof![
        Just(IntegerStamp::unrestricted(32)),
        (-1000i64..1000, 0i64..1000).prop_map(|(lo, len)| IntegerStamp::for_bounds(32, lo, lo + len)),
    ]
}

/// Build the graph; every step may refer to any earlier value.
fn build(params: &[IntegerStamp], steps: &[Step]) -> Graph {
    let mut b = GraphBuilder::new();
    let mut values: Vec<NodeId> = params
        .iter()
        .enumerate()
        .map(|(i, &s)| b.parameter(i as u16, Stamp::Integer(s)))
        .collect();

    for (bci, step) in steps.iter().enumerate() {
        let pick = |i: usize| values[i % values.len()];
        let value = match *step {
            Step::Constant(c) => b.int(c),
            Step::Negate(x) => {
                let x = pick(x);
                b.negate(x)
            }
            Step::Add(x, y) => {
                let (x, y) = (pick(x), pick(y));
                b.add(x, y)
            }
            Step::Sub(x, y) => {
                let (x, y) = (pick(x), pick(y));
                b.sub(x, y)
            }
            Step::AddExact(x, y) => {
                let (x, y) = (pick(x), pick(y));
                b.add_exact(x, y, bci as u32)
            }
        };
        values.push(value);
    }

    let result = *values.last().unwrap();
    b.ret(result);
    b.finish()
}

// =============================================================================
// Interpreter
// =============================================================================

/// How an execution of a graph ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Return(i64),
    /// Overflow trap, resuming at the given bytecode index.
    Deopt(u32),
}

fn wrap(bits: u32, value: i128) -> i64 {
    let shift = 128 - bits;
    ((value << shift) >> shift) as i64
}

fn width(graph: &Graph, node: NodeId) -> u32 {
    graph.stamp(node).as_integer().map_or(64, |s| s.bits())
}

struct Interpreter<'a> {
    graph: &'a Graph,
    args: &'a [i64],
    /// Results of fixed nodes already executed, plus memoized floating values.
    values: FxHashMap<NodeId, i64>,
}

impl<'a> Interpreter<'a> {
    fn new(graph: &'a Graph, args: &'a [i64]) -> Self {
        Interpreter { graph, args, values: FxHashMap::default() }
    }

    fn value(&mut self, node: NodeId) -> i64 {
        if let Some(&v) = self.values.get(&node) {
            return v;
        }
        let graph = self.graph;
        let n = graph.node(node);
        let bits = width(graph, node);
        let v = match n.op {
            Operator::Constant(c) => c.value(),
            Operator::Parameter(i) => self.args[i as usize],
            Operator::IntOp(ArithOp::Neg) => {
                let x = self.value(n.inputs()[0]);
                wrap(bits, -(x as i128))
            }
            Operator::IntOp(ArithOp::Add) => {
                let (x, y) = (self.value(n.inputs()[0]), self.value(n.inputs()[1]));
                wrap(bits, x as i128 + y as i128)
            }
            Operator::IntOp(ArithOp::Sub) => {
                let (x, y) = (self.value(n.inputs()[0]), self.value(n.inputs()[1]));
                wrap(bits, x as i128 - y as i128)
            }
            ref op => panic!("{node} ({op:?}) has not executed yet"),
        };
        self.values.insert(node, v);
        v
    }

    /// Checked sum of the first two inputs of `node`.
    fn exact_sum(&mut self, node: NodeId) -> Option<i64> {
        let graph = self.graph;
        let inputs = graph.node(node).inputs();
        let (x, y) = (inputs[0], inputs[1]);
        let exact = self.value(x) as i128 + self.value(y) as i128;
        let wrapped = wrap(width(graph, x), exact);
        (wrapped as i128 == exact).then_some(wrapped)
    }

    fn deopt_target(&self, state: NodeId) -> u32 {
        match self.graph.node(state).op {
            Operator::FrameState(bci) => bci,
            ref op => panic!("deoptimizing to {op:?}"),
        }
    }

    fn run(mut self) -> Outcome {
        let graph = self.graph;
        let mut current = graph.start();
        loop {
            let n = graph.node(current);
            let next = match n.op {
                Operator::Control(ControlOp::Start | ControlOp::Begin) => n.next(),
                Operator::Control(ControlOp::Return) => {
                    return Outcome::Return(self.value(n.inputs()[0]));
                }
                Operator::Exact(ArithOp::AddExact) => match self.exact_sum(current) {
                    Some(sum) => {
                        self.values.insert(current, sum);
                        n.next()
                    }
                    None => return Outcome::Deopt(self.deopt_target(n.inputs()[2])),
                },
                Operator::ExactSplit(ArithOp::AddExact, _) => match self.exact_sum(current) {
                    Some(sum) => {
                        self.values.insert(current, sum);
                        Some(n.successors()[0])
                    }
                    None => Some(n.successors()[1]),
                },
                Operator::Deoptimize(..) => {
                    return Outcome::Deopt(self.deopt_target(n.inputs()[0]));
                }
                ref op => panic!("unexpected fixed node {current} ({op:?})"),
            };
            current = next.unwrap_or_else(|| panic!("{current} falls off control flow"));
        }
    }
}

/// Parameter values drawn from inside each parameter's stamp, biased
/// towards the bounds.
fn arguments(params: &[IntegerStamp], picks: &[(u8, u64)]) -> Vec<i64> {
    params
        .iter()
        .zip(picks)
        .map(|(s, &(choice, raw))| {
            let (lo, hi) = (s.lower_bound(), s.upper_bound());
            match choice % 4 {
                0 => lo,
                1 => hi,
                _ => lo + (raw % ((hi - lo) as u64 + 1)) as i64,
            }
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn test_canonicalization_terminates(
        params in prop::collection::vec(parameter_stamp(), 1..3),
        steps in prop::collection::vec(step(), 1..24),
    ) {
        let mut graph = build(&params, &steps);
        let config = CompilerConfig::default();
        let budget = config.rewrite_budget(graph.live_count());

        let stats = Canonicalizer::with_config(&config).apply(&mut graph);
        prop_assert!(stats.is_ok(), "{:?} on {:?}", stats, graph);
        prop_assert!(stats.unwrap().rewrites <= budget);
        prop_assert!(graph.is_canonical());
        prop_assert!(graph.verify().is_ok(), "{:?}", graph.verify());

        // At the fixpoint nothing changes any more.
        let epoch = graph.epoch();
        let again = Canonicalizer::with_config(&config).apply(&mut graph).unwrap();
        prop_assert_eq!(again.rewrites, 0);
        prop_assert_eq!(graph.epoch(), epoch);
    }

    #[test]
    fn test_lowering_removes_all_exact_nodes(
        params in prop::collection::vec(parameter_stamp(), 1..3),
        steps in prop::collection::vec(step(), 1..24),
    ) {
        let mut graph = build(&params, &steps);
        Canonicalizer::new().apply(&mut graph).unwrap();
        ExactArithmeticLowering::new().apply(&mut graph).unwrap();

        prop_assert!(!graph.iter().any(|(_, n)| matches!(n.op, Operator::Exact(_))));
        prop_assert!(graph.verify().is_ok(), "{:?}", graph.verify());
    }

    #[test]
    fn test_rewriting_preserves_behavior(
        params in prop::collection::vec(parameter_stamp(), 1..3),
        steps in prop::collection::vec(step(), 1..24),
        inputs in prop::collection::vec(prop::collection::vec(any::<(u8, u64)>(), 2), 1..16),
    ) {
        let original = build(&params, &steps);
        let mut canonical = build(&params, &steps);
        Canonicalizer::new().apply(&mut canonical).unwrap();
        let mut lowered = build(&params, &steps);
        Canonicalizer::new().apply(&mut lowered).unwrap();
        ExactArithmeticLowering::new().apply(&mut lowered).unwrap();

        for picks in &inputs {
            let args = arguments(&params, picks);
            let expected = Interpreter::new(&original, &args).run();
            prop_assert_eq!(Interpreter::new(&canonical, &args).run(), expected, "{:?}", args);
            prop_assert_eq!(Interpreter::new(&lowered, &args).run(), expected, "{:?}", args);
        }
    }
}
