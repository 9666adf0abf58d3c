use num_bigint::{BigUint, RandBigInt};
use num_traits::{One, Zero};
use rand::Rng;

/// Round count used by the pipeline: false-positive probability <= 4^-5
pub const DEFAULT_ROUNDS: u32 = 5;

/// Miller-Rabin probabilistic primality test.
///
/// Returns `false` only when `n` is certainly composite. A `true` verdict is
/// wrong with probability at most `4^-rounds`.
pub fn is_probably_prime(n: &BigUint, rounds: u32) -> bool {
    is_probably_prime_with(n, rounds, &mut rand::thread_rng())
}

/// Same as [`is_probably_prime`], drawing witnesses from the given generator.
pub fn is_probably_prime_with<R: Rng + ?Sized>(n: &BigUint, rounds: u32, rng: &mut R) -> bool {
    let two = BigUint::from(2u32);
    let three = BigUint::from(3u32);

    if *n == two || *n == three {
        return true;
    }
    if *n < two || (n % 2u32).is_zero() {
        return false;
    }

    // n is odd and >= 5 from here on, so [2, n - 2] is never empty
    let n_minus_one = n - 1u32;
    let (d, s) = split_power_of_two(&n_minus_one);

    for _ in 0..rounds {
        let a = rng.gen_biguint_range(&two, &n_minus_one);
        if is_witness(&a, &d, s, n, &n_minus_one) {
            return false;
        }
    }

    true
}

/// Write `m = d * 2^s` with `d` odd
fn split_power_of_two(m: &BigUint) -> (BigUint, u32) {
    let mut d = m.clone();
    let mut s = 0;

    while !d.is_zero() && (&d % 2u32).is_zero() {
        d >>= 1u32;
        s += 1;
    }

    (d, s)
}

/// True when `a` proves `n` composite
fn is_witness(a: &BigUint, d: &BigUint, s: u32, n: &BigUint, n_minus_one: &BigUint) -> bool {
    let mut x = mod_pow(a, d, n);
    if x.is_one() || x == *n_minus_one {
        return false;
    }

    for _ in 1..s {
        x = &x * &x % n;
        if x == *n_minus_one {
            return false;
        }
    }

    true
}

/// `base^exp mod modulus` by repeated squaring.
///
/// # Panics
///
/// Panics if `modulus` is zero.
pub fn mod_pow(base: &BigUint, exp: &BigUint, modulus: &BigUint) -> BigUint {
    assert!(!modulus.is_zero(), "modulus must be non-zero");

    if modulus.is_one() {
        return BigUint::zero();
    }

    let mut result = BigUint::one();
    let mut base = base % modulus;
    let mut exp = exp.clone();

    while !exp.is_zero() {
        if (&exp % 2u32).is_one() {
            result = &result * &base % modulus;
        }
        base = &base * &base % modulus;
        exp >>= 1u32;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const MERSENNE_127: &str = "170141183460469231731687303715884105727";

    fn big(value: &str) -> BigUint {
        value.parse().unwrap()
    }

    fn is_prime_by_trial_division(n: u64) -> bool {
        if n < 2 {
            return false;
        }
        let mut i = 2;
        while i * i <= n {
            if n % i == 0 {
                return false;
            }
            i += 1;
        }
        true
    }

    #[test]
    fn test_known_primes() {
        for p in ["2", "3", "5", "97", "7919", MERSENNE_127] {
            assert!(is_probably_prime(&big(p), DEFAULT_ROUNDS), "{} should be prime", p);
        }
    }

    #[test]
    fn test_trivial_inputs() {
        for n in 0u32..2 {
            assert!(!is_probably_prime(&BigUint::from(n), DEFAULT_ROUNDS));
        }
        assert!(!is_probably_prime(&BigUint::from(4u32), DEFAULT_ROUNDS));
    }

    #[test]
    fn test_matches_trial_division_below_2000() {
        let mut rng = StdRng::seed_from_u64(7);
        for n in 0u64..2000 {
            assert_eq!(
                is_probably_prime_with(&BigUint::from(n), 20, &mut rng),
                is_prime_by_trial_division(n),
                "disagreement at {}",
                n
            );
        }
    }

    #[test]
    fn test_large_composites() {
        // 2^64 + 1 = 274177 * 67280421310721
        assert!(!is_probably_prime(&big("18446744073709551617"), DEFAULT_ROUNDS));
        // M127 * 3
        let m127 = big(MERSENNE_127);
        assert!(!is_probably_prime(&(&m127 * 3u32), DEFAULT_ROUNDS));
    }

    #[test]
    fn test_carmichael_numbers_rejected() {
        let trials = 1000;

        for carmichael in [561u32, 1105, 1729] {
            let n = BigUint::from(carmichael);
            let rejected = (0..trials)
                .filter(|_| !is_probably_prime(&n, DEFAULT_ROUNDS))
                .count();

            assert!(
                rejected * 1000 >= trials * 995,
                "{} rejected only {}/{} times",
                carmichael,
                rejected,
                trials
            );
        }
    }

    #[test]
    fn test_zero_rounds_only_screens_small_cases() {
        assert!(is_probably_prime(&BigUint::from(9u32), 0));
        assert!(!is_probably_prime(&BigUint::from(10u32), 0));
    }

    #[test]
    fn test_mod_pow() {
        assert_eq!(
            mod_pow(&BigUint::from(4u32), &BigUint::from(13u32), &BigUint::from(497u32)),
            BigUint::from(445u32)
        );
        assert_eq!(
            mod_pow(&BigUint::from(5u32), &BigUint::zero(), &BigUint::from(7u32)),
            BigUint::one()
        );
        assert_eq!(
            mod_pow(&BigUint::from(5u32), &BigUint::from(3u32), &BigUint::one()),
            BigUint::zero()
        );
    }

    #[test]
    fn test_split_power_of_two() {
        let (d, s) = split_power_of_two(&BigUint::from(560u32));
        assert_eq!(d, BigUint::from(35u32));
        assert_eq!(s, 4);
    }

    proptest! {
        #[test]
        fn even_numbers_above_two_are_composite(half in 2u64..u64::MAX / 2, rounds in 1u32..8) {
            let n = BigUint::from(half) * 2u32;
            prop_assert!(!is_probably_prime(&n, rounds));
        }

        #[test]
        fn mod_pow_agrees_with_modpow(base in any::<u64>(), exp in any::<u32>(), modulus in 1u64..) {
            let (base, exp, modulus) =
                (BigUint::from(base), BigUint::from(exp), BigUint::from(modulus));
            prop_assert_eq!(mod_pow(&base, &exp, &modulus), base.modpow(&exp, &modulus));
        }
    }
}
