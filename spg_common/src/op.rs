/// Forwards `std::ops` traits of a single-field numeric newtype to the wrapped value.
///
/// ```ignore
/// op!(Cents => Add::add, Sub::sub);
/// op!(Cents => assign AddAssign::add_assign);
/// op!(Cents => unary Neg::neg);
/// ```
#[macro_export]
macro_rules! op {
    ($t:ident => assign $($tr:ident::$f:ident),+ $(,)?) => {
        $(
            impl $tr for $t {
                fn $f(&mut self, rhs: $t) {
                    self.0.$f(rhs.0);
                }
            }
        )+
    };
    ($t:ident => unary $($tr:ident::$f:ident),+ $(,)?) => {
        $(
            impl $tr for $t {
                type Output = $t;
                fn $f(self) -> $t {
                    $t(self.0.$f())
                }
            }
        )+
    };
    ($t:ident => $($tr:ident::$f:ident),+ $(,)?) => {
        $(
            impl $tr for $t {
                type Output = $t;
                fn $f(self, rhs: $t) -> $t {
                    $t(self.0.$f(rhs.0))
                }
            }
        )+
    };
}
