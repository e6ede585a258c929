//! Property tests: folded stamps describe every concrete result.
//!
//! For each width, operand stamps are built around sampled values and every
//! sampled pair is pushed through the concrete operation. The result must be
//! contained (bounds and masks) in the folded stamp.

use keel_jit::ir::arith::ArithOp;
use keel_jit::ir::constant::Constant;
use keel_jit::ir::stamp::{IntegerStamp, mask, max_value, min_value, sign_extend};
use proptest::prelude::*;

const WIDTHS: [u32; 4] = [8, 16, 32, 64];

/// A `bits`-wide value, biased toward the edges of the range.
fn value(bits: u32) -> impl Strategy<Value = i64> {
    prop_oneof![
        1 => Just(min_value(bits)),
        1 => Just(max_value(bits)),
        1 => Just(0i64),
        1 => Just(-1i64),
        1 => Just(1i64),
        1 => (0u32..bits).prop_map(move |shift| sign_extend(1u64 << shift, bits)),
        4 => any::<u64>().prop_map(move |v| sign_extend(v & mask(bits), bits)),
        2 => (-16i64..16).prop_map(move |v| v.clamp(min_value(bits), max_value(bits))),
    ]
}

/// An operand stamp together with values it contains.
#[derive(Debug, Clone)]
struct Sampled {
    stamp: IntegerStamp,
    values: Vec<i64>,
}

fn sampled(bits: u32) -> impl Strategy<Value = Sampled> {
    let hull = prop::collection::vec(value(bits), 1..4).prop_map(move |values| {
        let stamp = values
            .iter()
            .map(|&v| IntegerStamp::for_constant(bits, v))
            .reduce(|a, b| a.meet(&b))
            .unwrap();
        Sampled { stamp, values }
    });
    let range = (value(bits), value(bits), any::<u64>()).prop_map(move |(a, b, pick)| {
        let (lo, hi) = (a.min(b), a.max(b));
        let span = (hi as i128 - lo as i128 + 1) as u128;
        let inner = (lo as i128 + (pick as u128 % span) as i128) as i64;
        Sampled {
            stamp: IntegerStamp::for_bounds(bits, lo, hi),
            values: vec![lo, hi, inner],
        }
    });
    prop_oneof![hull, range]
}

fn operands() -> impl Strategy<Value = (Sampled, Sampled)> {
    prop::sample::select(WIDTHS.to_vec()).prop_flat_map(|bits| (sampled(bits), sampled(bits)))
}

fn check_binary(op: ArithOp, x: &Sampled, y: &Sampled) -> Result<(), TestCaseError> {
    let folded = op.fold_stamp(&[x.stamp, y.stamp]);
    let bits = x.stamp.bits();
    for &a in &x.values {
        for &b in &y.values {
            let Ok(result) = op.fold_constant(&[Constant::new(bits, a), Constant::new(bits, b)])
            else {
                // An overflowing exact add never produces a value.
                continue;
            };
            prop_assert!(
                folded.contains(result.value()),
                "{op}({a}, {b}) = {} escapes {folded:?} from {:?} and {:?}",
                result.value(),
                x.stamp,
                y.stamp
            );
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(2048))]

    #[test]
    fn test_sampled_stamps_contain_their_values((x, _) in operands()) {
        for &v in &x.values {
            prop_assert!(x.stamp.contains(v), "{v} not in {:?}", x.stamp);
        }
    }

    #[test]
    fn test_negate_is_sound((x, _) in operands()) {
        let folded = ArithOp::Neg.fold_stamp(&[x.stamp]);
        let bits = x.stamp.bits();
        for &v in &x.values {
            let result = ArithOp::Neg.fold_constant(&[Constant::new(bits, v)]).unwrap();
            prop_assert!(folded.contains(result.value()), "-{v} escapes {folded:?}");
        }
    }

    #[test]
    fn test_add_is_sound((x, y) in operands()) {
        check_binary(ArithOp::Add, &x, &y)?;
    }

    #[test]
    fn test_sub_is_sound((x, y) in operands()) {
        check_binary(ArithOp::Sub, &x, &y)?;
    }

    #[test]
    fn test_add_exact_is_sound((x, y) in operands()) {
        check_binary(ArithOp::AddExact, &x, &y)?;
    }

    #[test]
    fn test_join_keeps_shared_values((x, y) in operands()) {
        let shared: Vec<i64> = x
            .values
            .iter()
            .copied()
            .filter(|&v| y.stamp.contains(v))
            .collect();
        match x.stamp.join(&y.stamp) {
            Some(joined) => {
                for v in shared {
                    prop_assert!(joined.contains(v));
                }
            }
            None => prop_assert!(shared.is_empty()),
        }
    }
}

#[test]
fn test_boundary_add_exact() {
    for bits in WIDTHS {
        let max = IntegerStamp::for_constant(bits, max_value(bits));
        let one = IntegerStamp::for_constant(bits, 1);
        // Overflows on every input: the stamp still exists and is a valid stamp.
        let folded = ArithOp::AddExact.fold_stamp(&[max, one]);
        assert_eq!(folded.bits(), bits);
        assert!(
            ArithOp::AddExact
                .fold_constant(&[Constant::new(bits, max_value(bits)), Constant::new(bits, 1)])
                .is_err()
        );
    }
}
