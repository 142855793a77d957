//! Property tests for split/combine workflows

use quickcheck::{Arbitrary, Gen, TestResult};
use quickcheck_macros::quickcheck;
use sharevault::codec;
use sharevault::domain::{KeyConfig, Threshold, Topology};
use sharevault::keys::{self, Share, SplittingKey};
use sharevault::value::{Scalar, Value};
use sharevault::{KeyMode, Operation};

/// Scalars the store operation can split
#[derive(Clone, Debug)]
struct Storable(Value);

impl Arbitrary for Storable {
    fn arbitrary(g: &mut Gen) -> Self {
        let scalar = match u8::arbitrary(g) % 4 {
            0 => Scalar::Int(i64::arbitrary(g)),
            1 => Scalar::UInt(u64::arbitrary(g)),
            // finite, exactly representable
            2 => Scalar::Float(f64::from(i32::arbitrary(g)) / 8.0),
            _ => Scalar::Text(String::arbitrary(g)),
        };
        Storable(Value::Scalar(scalar))
    }
}

/// Cluster size with a threshold no larger than it
#[derive(Clone, Copy, Debug)]
struct ClusterParams {
    nodes: u8,
    threshold: u8,
}

impl Arbitrary for ClusterParams {
    fn arbitrary(g: &mut Gen) -> Self {
        // 1..=12 nodes keeps the dealer cheap
        let nodes = (u8::arbitrary(g) % 12) + 1;
        let threshold = (u8::arbitrary(g) % nodes) + 1;
        ClusterParams { nodes, threshold }
    }
}

impl ClusterParams {
    fn key(self, mode: KeyMode) -> SplittingKey {
        let config = KeyConfig::with_threshold(
            Topology::new(self.nodes.into()).unwrap(),
            Threshold::new(self.threshold).unwrap(),
            mode,
            Operation::Store,
        )
        .unwrap();
        SplittingKey::generate(config).unwrap()
    }
}

fn mode(secret: bool) -> KeyMode {
    if secret {
        KeyMode::Secret
    } else {
        KeyMode::Cluster
    }
}

/// Deterministic shuffle of `0..len` driven by `seed`
fn shuffled(len: usize, seed: u64) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..len).collect();
    let mut seed = seed;
    for i in 0..indices.len() {
        seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        let range = u64::try_from(indices.len() - i)
            .unwrap_or_else(|_| unreachable!("range fits in u64"));
        let offset = usize::try_from(seed % range)
            .unwrap_or_else(|_| unreachable!("offset < range fits in usize"));
        indices.swap(i, i + offset);
    }
    indices
}

/// Test that the full share set always recombines to the original value
#[quickcheck]
fn prop_split_combine_round_trip(value: Storable, params: ClusterParams, secret: bool) -> bool {
    let key = params.key(mode(secret));
    let Ok(shares) = key.split(&value.0) else {
        return false;
    };
    shares.len() == usize::from(params.nodes) && key.combine(&shares) == Ok(value.0)
}

/// Test that any threshold-sized selection of shares, in any order, recombines
#[quickcheck]
fn prop_random_share_selection_works(
    value: Storable,
    params: ClusterParams,
    secret: bool,
    selection_seed: u64,
) -> bool {
    let key = params.key(mode(secret));
    let Ok(shares) = key.split(&value.0) else {
        return false;
    };
    let selected: Vec<Share> = shuffled(shares.len(), selection_seed)
        .into_iter()
        .take(params.threshold.into())
        .map(|idx| shares[idx].clone())
        .collect();
    key.combine(&selected) == Ok(value.0)
}

/// Test that fewer shares than the threshold never recombine
#[quickcheck]
fn prop_insufficient_shares_fail(value: Storable, params: ClusterParams) -> TestResult {
    if params.threshold < 2 {
        return TestResult::discard();
    }
    let key = params.key(KeyMode::Cluster);
    let shares = key.split(&value.0).unwrap();
    let insufficient = &shares[..usize::from(params.threshold) - 1];
    TestResult::from_bool(key.combine(insufficient).is_err())
}

/// Test that a flipped byte in a share is detected instead of yielding a wrong value
#[quickcheck]
fn prop_tampered_share_detected(
    value: Storable,
    params: ClusterParams,
    secret: bool,
    flip: u8,
) -> TestResult {
    if flip == 0 {
        return TestResult::discard();
    }
    let key = params.key(mode(secret));
    let mut shares = key.split(&value.0).unwrap();
    let Share::Text(text) = &shares[0] else {
        return TestResult::failed();
    };
    let mut bytes = codec::decode_share(text).unwrap().to_vec();
    // byte 0 is the x-coordinate, tamper with the first y byte
    bytes[1] ^= flip;
    shares[0] = Share::Text(codec::encode_share(&bytes));

    let selected = &shares[..usize::from(params.threshold)];
    TestResult::from_bool(key.combine(selected) != Ok(value.0))
}

/// Test that additive shares sum back to the original integer
#[quickcheck]
fn prop_sum_round_trip(n: i32, nodes: u8) -> bool {
    let nodes = usize::from(nodes % 12) + 1;
    let key = keys::initialize(nodes, KeyMode::Cluster, Operation::Sum).unwrap();
    let value = Value::from(i64::from(n));
    let shares = key.split(&value).unwrap();
    shares.len() == nodes
        && shares
            .iter()
            .all(|s| matches!(s, Share::Additive(v) if *v < keys::SUM_MODULUS))
        && key.combine(&shares) == Ok(value)
}

/// Test that sum shares are useless without every node
#[quickcheck]
fn prop_sum_requires_every_share(n: i32, nodes: u8) -> TestResult {
    let nodes = usize::from(nodes % 12) + 1;
    if nodes < 2 {
        return TestResult::discard();
    }
    let key = keys::initialize(nodes, KeyMode::Cluster, Operation::Sum).unwrap();
    let shares = key.split(&Value::from(i64::from(n))).unwrap();
    TestResult::from_bool(key.combine(&shares[1..]).is_err())
}
