//! Number-theoretic primitives shared by the residue-lift experiments:
//! modular arithmetic on u64 with u128 intermediates, prime sieving,
//! primorials, and a Miller-Rabin primality oracle.

use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::Rng;

/// The first fifteen primes. Their product (47#) is the largest primorial
/// that fits in a u64.
pub const SMALL_PRIMES: [u64; 15] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47];

/// Modular exponentiation: base^exp mod m using the binary method.
pub fn mod_pow(mut base: u64, mut exp: u64, m: u64) -> u64 {
    if m == 1 {
        return 0;
    }
    let m = m as u128;
    let mut result = 1u128;
    base %= m as u64;
    let mut b = base as u128;
    while exp > 0 {
        if exp & 1 == 1 {
            result = result * b % m;
        }
        exp >>= 1;
        b = b * b % m;
    }
    result as u64
}

/// Modular multiplication without overflow.
#[inline]
pub fn mul_mod(a: u64, b: u64, m: u64) -> u64 {
    (a as u128 * b as u128 % m as u128) as u64
}

/// Extended GCD: returns (gcd, x, y) such that a*x + b*y = gcd.
fn extended_gcd(a: i128, b: i128) -> (i128, i128, i128) {
    if a == 0 {
        return (b, 0, 1);
    }
    let (g, x, y) = extended_gcd(b % a, a);
    (g, y - (b / a) * x, x)
}

/// Modular inverse: a^{-1} mod m. Returns None if gcd(a, m) != 1 or m < 2.
pub fn mod_inv(a: u64, m: u64) -> Option<u64> {
    if m < 2 {
        return None;
    }
    let a = a % m;
    if a == 0 {
        return None;
    }
    let (g, x, _) = extended_gcd(a as i128, m as i128);
    if g != 1 {
        return None;
    }
    Some(x.rem_euclid(m as i128) as u64)
}

/// Greatest common divisor.
pub fn gcd(a: u64, b: u64) -> u64 {
    a.gcd(&b)
}

/// Generate all primes up to `limit` using a simple sieve.
pub fn primes_up_to(limit: u64) -> Vec<u64> {
    if limit < 2 {
        return vec![];
    }
    let n = limit as usize;
    let mut is_prime = vec![true; n + 1];
    is_prime[0] = false;
    is_prime[1] = false;
    let mut i = 2;
    while i * i <= n {
        if is_prime[i] {
            let mut j = i * i;
            while j <= n {
                is_prime[j] = false;
                j += i;
            }
        }
        i += 1;
    }
    is_prime
        .into_iter()
        .enumerate()
        .filter(|(_, p)| *p)
        .map(|(i, _)| i as u64)
        .collect()
}

/// The first `n` primes, in increasing order.
pub fn first_primes(n: usize) -> Vec<u64> {
    if n <= SMALL_PRIMES.len() {
        return SMALL_PRIMES[..n].to_vec();
    }
    // p_n < n (ln n + ln ln n) for n >= 6
    let nf = n as f64;
    let bound = (nf * (nf.ln() + nf.ln().ln())).ceil() as u64 + 1;
    let mut primes = primes_up_to(bound);
    primes.truncate(n);
    primes
}

/// Product of the first `n` primes, or None if it overflows a u64.
pub fn primorial(n: usize) -> Option<u64> {
    first_primes(n)
        .into_iter()
        .try_fold(1u64, |acc, p| acc.checked_mul(p))
}

/// Product of the first `n` primes as an arbitrary precision integer.
pub fn primorial_big(n: usize) -> BigUint {
    first_primes(n)
        .into_iter()
        .fold(BigUint::one(), |acc, p| acc * BigUint::from(p))
}

/// If `m` is the product of the first k primes, return k.
pub fn primorial_index(m: u64) -> Option<usize> {
    if m == 1 {
        return Some(0);
    }
    let mut acc = 1u64;
    for (i, &p) in SMALL_PRIMES.iter().enumerate() {
        acc = acc.checked_mul(p)?;
        if acc == m {
            return Some(i + 1);
        }
        if acc > m {
            return None;
        }
    }
    None
}

/// Distinct prime factors of `n` by trial division, in increasing order.
pub fn distinct_prime_factors(mut n: u64) -> Vec<u64> {
    let mut factors = Vec::new();
    let mut d = 2u64;
    while d.saturating_mul(d) <= n {
        if n % d == 0 {
            factors.push(d);
            while n % d == 0 {
                n /= d;
            }
        }
        d += if d == 2 { 1 } else { 2 };
    }
    if n > 1 {
        factors.push(n);
    }
    factors
}

/// Deterministic Miller-Rabin for u64 using the first twelve prime bases.
pub fn is_prime_u64(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    if n < 4 {
        return true;
    }
    if n % 2 == 0 || n % 3 == 0 {
        return false;
    }

    let (d, s) = split_odd(n - 1);
    const WITNESSES: [u64; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];
    WITNESSES
        .iter()
        .filter(|&&a| a < n)
        .all(|&a| passes_round(a, d, s, n))
}

/// Write n = 2^s * d with d odd.
fn split_odd(mut d: u64) -> (u64, u32) {
    let mut s = 0u32;
    while d % 2 == 0 {
        d /= 2;
        s += 1;
    }
    (d, s)
}

/// One strong-probable-prime round of witness `a` against odd `n`.
fn passes_round(a: u64, d: u64, s: u32, n: u64) -> bool {
    let mut x = mod_pow(a, d, n);
    if x == 1 || x == n - 1 {
        return true;
    }
    for _ in 1..s {
        x = mul_mod(x, x, n);
        if x == n - 1 {
            return true;
        }
    }
    false
}

/// Miller-Rabin probabilistic primality test with random witnesses.
pub fn is_probably_prime(n: &BigUint, rounds: u32) -> bool {
    let one = BigUint::one();
    let two = &one + &one;
    let three = &two + &one;

    if *n < two {
        return false;
    }
    if *n == two || *n == three {
        return true;
    }
    if n.is_even() {
        return false;
    }

    // Write n-1 as 2^r * d
    let n_minus_1 = n - &one;
    let mut d = n_minus_1.clone();
    let mut r: u32 = 0;
    while d.is_even() {
        d >>= 1u32;
        r += 1;
    }

    let mut rng = rand::thread_rng();

    'witness: for _ in 0..rounds {
        // Random a in [2, n-2]
        let a = loop {
            let bytes = n.to_bytes_be();
            let mut random_bytes = vec![0u8; bytes.len()];
            rng.fill(&mut random_bytes[..]);
            let a = BigUint::from_bytes_be(&random_bytes) % n;
            if a >= two && a <= &n_minus_1 - &one {
                break a;
            }
        };

        let mut x = a.modpow(&d, n);

        if x == one || x == n_minus_1 {
            continue 'witness;
        }

        for _ in 0..r - 1 {
            x = x.modpow(&two, n);
            if x == n_minus_1 {
                continue 'witness;
            }
        }

        return false;
    }

    true
}

/// Miller-Rabin on a u64 with `rounds` random witnesses.
pub fn is_probably_prime_u64(n: u64, rounds: u32, rng: &mut impl Rng) -> bool {
    if n < 2 {
        return false;
    }
    if n < 4 {
        return true;
    }
    if n % 2 == 0 {
        return false;
    }
    let (d, s) = split_odd(n - 1);
    (0..rounds).all(|_| {
        let a = if n > 4 { rng.gen_range(2..=n - 2) } else { 2 };
        passes_round(a, d, s, n)
    })
}

/// A probabilistic primality oracle.
///
/// Callers only rely on "probably prime" / "composite" answers; the
/// residue-lift arithmetic never consults an oracle.
pub trait PrimalityOracle {
    fn is_probably_prime(&self, n: &BigUint) -> bool;

    fn is_probably_prime_u64(&self, n: u64) -> bool {
        self.is_probably_prime(&BigUint::from(n))
    }
}

/// Miller-Rabin oracle with a fixed number of random trial rounds.
#[derive(Debug, Clone, Copy)]
pub struct MillerRabin {
    pub rounds: u32,
}

impl MillerRabin {
    pub fn new(rounds: u32) -> Self {
        Self { rounds }
    }
}

impl Default for MillerRabin {
    fn default() -> Self {
        Self { rounds: 20 }
    }
}

impl PrimalityOracle for MillerRabin {
    fn is_probably_prime(&self, n: &BigUint) -> bool {
        if n.is_zero() {
            return false;
        }
        is_probably_prime(n, self.rounds)
    }

    fn is_probably_prime_u64(&self, n: u64) -> bool {
        is_probably_prime_u64(n, self.rounds, &mut rand::thread_rng())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_mod_pow() {
        assert_eq!(mod_pow(2, 10, 1000), 24);
        assert_eq!(mod_pow(3, 0, 7), 1);
        assert_eq!(mod_pow(5, 3, 1), 0);
    }

    #[test]
    fn test_mod_inv() {
        assert_eq!(mod_inv(3, 7), Some(5));
        assert_eq!(mod_inv(2, 3), Some(2));
        assert_eq!(mod_inv(6, 9), None);
        assert_eq!(mod_inv(0, 5), None);
        assert_eq!(mod_inv(5, 5), None);
        for a in 1..23u64 {
            let inv = mod_inv(a, 23).unwrap();
            assert_eq!(a * inv % 23, 1, "inverse of {} mod 23", a);
        }
    }

    #[test]
    fn test_primes_up_to() {
        assert_eq!(primes_up_to(20), vec![2, 3, 5, 7, 11, 13, 17, 19]);
        assert_eq!(primes_up_to(1), vec![]);
        assert_eq!(primes_up_to(2), vec![2]);
    }

    #[test]
    fn test_first_primes() {
        assert_eq!(first_primes(5), vec![2, 3, 5, 7, 11]);
        let many = first_primes(100);
        assert_eq!(many.len(), 100);
        assert_eq!(many[99], 541);
    }

    #[test]
    fn test_primorial() {
        assert_eq!(primorial(0), Some(1));
        assert_eq!(primorial(1), Some(2));
        assert_eq!(primorial(5), Some(2310));
        assert_eq!(primorial(8), Some(9_699_690));
        assert_eq!(primorial(15), Some(614_889_782_588_491_410));
        assert_eq!(primorial(16), None);
        assert_eq!(
            primorial_big(16),
            BigUint::from(614_889_782_588_491_410u64) * BigUint::from(53u32)
        );
    }

    #[test]
    fn test_primorial_index() {
        assert_eq!(primorial_index(1), Some(0));
        assert_eq!(primorial_index(30), Some(3));
        assert_eq!(primorial_index(223_092_870), Some(9));
        assert_eq!(primorial_index(60), None);
        assert_eq!(primorial_index(7), None);
    }

    #[test]
    fn test_distinct_prime_factors() {
        assert_eq!(distinct_prime_factors(2310), vec![2, 3, 5, 7, 11]);
        assert_eq!(distinct_prime_factors(360), vec![2, 3, 5]);
        assert_eq!(distinct_prime_factors(97), vec![97]);
        assert!(distinct_prime_factors(1).is_empty());
    }

    #[test]
    fn test_is_prime_u64() {
        assert!(is_prime_u64(2));
        assert!(is_prime_u64(104_729));
        assert!(is_prime_u64(18_446_744_073_709_551_557));
        assert!(!is_prime_u64(1));
        assert!(!is_prime_u64(561));
        assert!(!is_prime_u64(3_215_031_751));
    }

    #[test]
    fn test_is_probably_prime() {
        assert!(is_probably_prime(&BigUint::from(7u32), 20));
        assert!(is_probably_prime(&BigUint::from(104729u32), 20));
        assert!(!is_probably_prime(&BigUint::from(100u32), 20));
        assert!(!is_probably_prime(&BigUint::from(1u32), 20));
    }

    #[test]
    fn test_probabilistic_agrees_with_deterministic() {
        let mut rng = StdRng::seed_from_u64(7);
        for n in 0..5000u64 {
            assert_eq!(
                is_probably_prime_u64(n, 10, &mut rng),
                is_prime_u64(n),
                "disagreement at n={}",
                n
            );
        }
    }

    #[test]
    fn test_miller_rabin_oracle() {
        let oracle = MillerRabin::new(20);
        assert!(oracle.is_probably_prime_u64(2_147_483_647));
        assert!(!oracle.is_probably_prime_u64(2_147_483_649));
        assert!(!oracle.is_probably_prime(&BigUint::zero()));
        // 2^89 - 1 is a Mersenne prime
        let m89 = (BigUint::one() << 89u32) - BigUint::one();
        assert!(oracle.is_probably_prime(&m89));
    }
}
