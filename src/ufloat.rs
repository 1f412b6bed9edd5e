//! Numbers with uncertainties, propagated to first order
//!
//! Every number created with `UFloat::new` is an independent variable. Derived
//! numbers remember how much each independent variable contributes to their
//! uncertainty, so that correlations are accounted for when the same input
//! enters a computation several times.

use std::{
    collections::BTreeMap,
    fmt,
    ops::{Add, Div, Mul, Sub},
    sync::atomic::{AtomicUsize, Ordering},
};

/// Source of identifiers for independent variables
static NEXT_VARIABLE: AtomicUsize = AtomicUsize::new(0);

/// A nominal value with a linearly propagated standard deviation
#[derive(Clone, Debug, PartialEq)]
pub struct UFloat {
    /// Nominal value
    nominal: f64,

    /// Derivative with respect to each independent variable, times the
    /// standard deviation of that variable
    components: BTreeMap<usize, f64>,
}
//
impl UFloat {
    /// Create a new independent variable
    pub fn new(nominal: f64, std_dev: f64) -> Self {
        let mut components = BTreeMap::new();
        if std_dev != 0. {
            let id = NEXT_VARIABLE.fetch_add(1, Ordering::Relaxed);
            components.insert(id, std_dev.abs());
        }
        Self {
            nominal,
            components,
        }
    }

    /// A number without uncertainty
    pub fn exact(nominal: f64) -> Self {
        Self::new(nominal, 0.)
    }

    /// Nominal value
    pub fn nominal(&self) -> f64 {
        self.nominal
    }

    /// Standard deviation
    pub fn std_dev(&self) -> f64 {
        self.components.values().fold(0., |acc, c| acc + c * c).sqrt()
    }

    /// Linear combination `a·self + b·other` of the uncertainty components
    fn combine(&self, a: f64, other: &Self, b: f64, nominal: f64) -> Self {
        let mut components = self
            .components
            .iter()
            .map(|(&id, &c)| (id, a * c))
            .collect::<BTreeMap<_, _>>();
        for (&id, &c) in &other.components {
            *components.entry(id).or_insert(0.) += b * c;
        }
        Self {
            nominal,
            components,
        }
    }
}

/// Compatibility of two values in standard deviations, rounded to 0.1
///
/// The uncertainties are combined as if the values were uncorrelated.
///
pub fn pull(a: &UFloat, b: &UFloat) -> f64 {
    let diff = (a.nominal - b.nominal).abs();
    let sigma = (a.std_dev().powi(2) + b.std_dev().powi(2)).sqrt();
    (10. * diff / sigma).round() / 10.
}

// Arithmetic is implemented on references, owned operands forward to it
impl<'a> Add<&'a UFloat> for &'a UFloat {
    type Output = UFloat;
    fn add(self, rhs: &'a UFloat) -> UFloat {
        self.combine(1., rhs, 1., self.nominal + rhs.nominal)
    }
}
//
impl<'a> Sub<&'a UFloat> for &'a UFloat {
    type Output = UFloat;
    fn sub(self, rhs: &'a UFloat) -> UFloat {
        self.combine(1., rhs, -1., self.nominal - rhs.nominal)
    }
}
//
impl<'a> Mul<&'a UFloat> for &'a UFloat {
    type Output = UFloat;
    fn mul(self, rhs: &'a UFloat) -> UFloat {
        self.combine(rhs.nominal, rhs, self.nominal, self.nominal * rhs.nominal)
    }
}
//
impl<'a> Div<&'a UFloat> for &'a UFloat {
    type Output = UFloat;
    fn div(self, rhs: &'a UFloat) -> UFloat {
        let inv = 1. / rhs.nominal;
        let quotient = self.nominal * inv;
        self.combine(inv, rhs, -quotient * inv, quotient)
    }
}

macro_rules! forward_owned_ops {
    ($($op:ident::$method:ident),*) => {$(
        impl $op<UFloat> for UFloat {
            type Output = UFloat;
            fn $method(self, rhs: UFloat) -> UFloat {
                (&self).$method(&rhs)
            }
        }
        impl<'a> $op<&'a UFloat> for UFloat {
            type Output = UFloat;
            fn $method(self, rhs: &'a UFloat) -> UFloat {
                (&self).$method(rhs)
            }
        }
        impl<'a> $op<UFloat> for &'a UFloat {
            type Output = UFloat;
            fn $method(self, rhs: UFloat) -> UFloat {
                self.$method(&rhs)
            }
        }
    )*};
}
forward_owned_ops!(Add::add, Sub::sub, Mul::mul, Div::div);

impl fmt::Display for UFloat {
    /// Displays `nominal+/-std_dev`, with the uncertainty rounded to two
    /// significant digits and the nominal value to the same decimal place
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let std_dev = self.std_dev();
        if std_dev == 0. || !std_dev.is_finite() {
            return write!(f, "{}+/-{}", self.nominal, std_dev);
        }

        // Place of the last significant digit of the uncertainty
        let mut last_digit = std_dev.log10().floor() as i32 - 1;
        let rounded = (std_dev / 10f64.powi(last_digit)).round();
        if rounded >= 100. {
            last_digit += 1;
        }

        // Very large or small numbers get a common exponent
        let magnitude = self.nominal.abs().max(std_dev).log10().floor() as i32;
        let exponent = if (-4..6).contains(&magnitude) {
            0
        } else {
            magnitude
        };
        let scale = 10f64.powi(exponent);
        let decimals = (exponent - last_digit).max(0) as usize;
        let (nominal, std_dev) = (self.nominal / scale, std_dev / scale);
        if exponent == 0 {
            write!(f, "{nominal:.decimals$}+/-{std_dev:.decimals$}")
        } else {
            write!(f, "({nominal:.decimals$}+/-{std_dev:.decimals$})e{exponent:+03}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-12 * a.abs().max(b.abs()).max(1.)
    }

    #[test]
    fn independent_variables_add_in_quadrature() {
        let (a, b) = (UFloat::new(1., 0.3), UFloat::new(2., 0.4));
        let sum = &a + &b;
        assert_eq!(sum.nominal(), 3.);
        assert!(close(sum.std_dev(), 0.5));
        assert!(close((&a - &b).std_dev(), 0.5));
    }

    #[test]
    fn self_correlation_is_tracked() {
        let x = UFloat::new(4., 0.2);
        assert_eq!((&x - &x).std_dev(), 0.);
        assert!(close((&x / &x).std_dev(), 0.));
        assert!(close((&x + &x).std_dev(), 0.4));
    }

    #[test]
    fn relative_errors_of_products() {
        let (a, b) = (UFloat::new(10., 1.), UFloat::new(5., 0.5));
        let product = &a * &b;
        let quotient = &a / &b;
        assert_eq!(product.nominal(), 50.);
        assert!(close(product.std_dev() / 50., 0.1 * 2f64.sqrt()));
        assert_eq!(quotient.nominal(), 2.);
        assert!(close(quotient.std_dev() / 2., 0.1 * 2f64.sqrt()));
    }

    #[test]
    fn shared_luminosity_cancels_in_double_ratio() {
        let lumi = UFloat::new(30., 3.);
        let (n1, n2) = (UFloat::exact(100.), UFloat::exact(20.));
        let ratio = (&n1 / &lumi) / (&n2 / &lumi);
        assert!(close(ratio.nominal(), 5.));
        assert!(ratio.std_dev() < 1e-12);
    }

    #[test]
    fn pulls() {
        assert_eq!(pull(&UFloat::exact(1.), &UFloat::new(1.25, 0.1)), 2.5);
        assert_eq!(pull(&UFloat::new(0., 3.), &UFloat::new(1., 4.)), 0.2);
    }

    #[test]
    fn display_rounds_to_two_significant_digits() {
        assert_eq!(UFloat::new(0.97012, 0.03217).to_string(), "0.970+/-0.032");
        assert_eq!(UFloat::new(1234.6, 56.7).to_string(), "1235+/-57");
        assert_eq!(UFloat::new(0.5, 0.0996).to_string(), "0.50+/-0.10");
        assert_eq!(UFloat::new(1.02e-3, 0.02e-3).to_string(), "0.001020+/-0.000020");
        assert_eq!(UFloat::new(6.24e-6, 0.2e-6).to_string(), "(6.24+/-0.20)e-06");
        assert_eq!(UFloat::exact(1.).to_string(), "1+/-0");
        assert_eq!(UFloat::new(0.08, 0.).to_string(), "0.08+/-0");
        assert!(UFloat::exact(2.).std_dev().is_sign_positive());
    }
}
