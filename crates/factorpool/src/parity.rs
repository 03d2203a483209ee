//! Parity of arbitrary-precision results.

use num_bigint::BigUint;

/// Whether `value` is odd, judged by the last digit of its decimal form.
///
/// Total over every value the pool produces, including the timeout
/// sentinel `0`, which is even.
pub fn is_odd(value: &BigUint) -> bool {
    let digits = value.to_str_radix(10);
    digits
        .as_bytes()
        .last()
        .is_some_and(|digit| (digit - b'0') % 2 == 1)
}
