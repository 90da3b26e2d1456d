//! CSI parameter lists with `:`-separated sub-parameters.
//!
//! Extended SGR (underline styles, truecolor) and the kitty protocols
//! rely on sub-parameters being preserved through dispatch, so the list
//! keeps every value together with a flag marking whether it continues
//! the previous parameter.

use smallvec::SmallVec;

/// Hard cap on stored values; further parameters are parsed but ignored,
/// matching the reference behavior for hostile input.
pub const MAX_PARAMS: usize = 32;

/// Largest accepted parameter value. Accumulation saturates here so
/// hostile digit runs cannot overflow.
pub const MAX_PARAM_VALUE: u32 = 0xFFFF_FFFF / 2;

/// A parsed CSI parameter list.
///
/// Values are stored flat; `continues` marks values that were separated
/// from their predecessor with `:` rather than `;`. [`Params::iter`]
/// yields one slice per `;`-separated parameter, sub-parameters included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    values: SmallVec<[u32; MAX_PARAMS]>,
    continues: SmallVec<[bool; MAX_PARAMS]>,
    /// Set when the current trailing value has seen at least one digit
    /// or separator, so `CSI m` (no params) and `CSI 0 m` are
    /// distinguishable.
    trailing: bool,
    /// Set once the cap is hit; further digits are discarded instead of
    /// mutating the last stored value.
    overflowed: bool,
}

impl Params {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `;`-separated parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.continues.iter().filter(|c| !**c).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate parameters; each item is the parameter's value followed
    /// by its sub-parameters.
    pub fn iter(&self) -> ParamsIter<'_> {
        ParamsIter {
            params: self,
            pos: 0,
        }
    }

    /// The `index`-th `;`-separated parameter's primary value, or
    /// `default` when absent.
    #[must_use]
    pub fn get(&self, index: usize, default: u32) -> u32 {
        self.iter().nth(index).map_or(default, |sub| sub[0])
    }

    /// Like [`Params::get`] but maps an explicit `0` to `default` as
    /// well, the common rule for count-style parameters.
    #[must_use]
    pub fn get_nonzero(&self, index: usize, default: u32) -> u32 {
        match self.get(index, default) {
            0 => default,
            v => v,
        }
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.continues.clear();
        self.trailing = false;
        self.overflowed = false;
    }

    /// Append a digit to the value under construction.
    pub fn push_digit(&mut self, digit: u8) {
        if !self.trailing {
            self.begin_value(false);
        }
        if self.overflowed {
            return;
        }
        if let Some(last) = self.values.last_mut() {
            *last = last
                .saturating_mul(10)
                .saturating_add(u32::from(digit))
                .min(MAX_PARAM_VALUE);
        }
    }

    /// Finish the current value; `sub` begins a sub-parameter.
    pub fn separator(&mut self, sub: bool) {
        if !self.trailing {
            self.begin_value(false);
        }
        self.trailing = false;
        // Eagerly allocate the next slot so `CSI ;5H` reads as (0, 5).
        self.begin_value(sub);
    }

    fn begin_value(&mut self, sub: bool) {
        if self.values.len() < MAX_PARAMS {
            self.values.push(0);
            self.continues.push(sub);
        } else {
            self.overflowed = true;
        }
        self.trailing = true;
    }

    /// Finalize after the last byte of the parameter string.
    pub fn finish(&mut self) {
        self.trailing = false;
    }
}

impl<'a> IntoIterator for &'a Params {
    type Item = &'a [u32];
    type IntoIter = ParamsIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over `;`-separated parameters as sub-slices.
pub struct ParamsIter<'a> {
    params: &'a Params,
    pos: usize,
}

impl<'a> Iterator for ParamsIter<'a> {
    type Item = &'a [u32];

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.pos;
        if start >= self.params.values.len() {
            return None;
        }
        let mut end = start + 1;
        while end < self.params.values.len() && self.params.continues[end] {
            end += 1;
        }
        self.pos = end;
        Some(&self.params.values[start..end])
    }
}

/// Build a [`Params`] from slices, mainly for tests and replay.
impl From<&[&[u32]]> for Params {
    fn from(groups: &[&[u32]]) -> Self {
        let mut params = Params::new();
        for (gi, group) in groups.iter().enumerate() {
            if gi > 0 {
                params.separator(false);
            }
            for (vi, &value) in group.iter().enumerate() {
                if vi > 0 {
                    params.separator(true);
                }
                if !params.trailing {
                    params.begin_value(vi > 0);
                }
                if let Some(last) = params.values.last_mut() {
                    *last = value;
                }
            }
        }
        params.finish();
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn feed(s: &str) -> Params {
        let mut p = Params::new();
        for b in s.bytes() {
            match b {
                b'0'..=b'9' => p.push_digit(b - b'0'),
                b';' => p.separator(false),
                b':' => p.separator(true),
                _ => {}
            }
        }
        p.finish();
        p
    }

    #[test]
    fn empty_list() {
        let p = feed("");
        assert!(p.is_empty());
        assert_eq!(p.get(0, 1), 1);
    }

    #[test]
    fn simple_params() {
        let p = feed("5;12");
        assert_eq!(p.len(), 2);
        assert_eq!(p.get(0, 0), 5);
        assert_eq!(p.get(1, 0), 12);
    }

    #[test]
    fn omitted_param_reads_as_zero() {
        let p = feed(";5");
        assert_eq!(p.get(0, 7), 0);
        assert_eq!(p.get(1, 0), 5);
    }

    #[test]
    fn subparams_grouped() {
        let p = feed("4:3;58:2:255:0:0");
        let groups: Vec<&[u32]> = p.iter().collect();
        assert_eq!(groups, vec![&[4, 3][..], &[58, 2, 255, 0, 0][..]]);
        assert_eq!(p.len(), 2);
    }

    #[test]
    fn value_saturates() {
        let p = feed("99999999999999999999");
        assert_eq!(p.get(0, 0), MAX_PARAM_VALUE);
    }

    #[test]
    fn excess_params_dropped() {
        let long = (0..100).map(|i| i.to_string()).collect::<Vec<_>>().join(";");
        let p = feed(&long);
        assert!(p.iter().count() <= MAX_PARAMS);
    }

    #[test]
    fn from_groups_roundtrip() {
        let p = Params::from(&[&[38_u32, 2, 10, 20, 30][..], &[1][..]][..]);
        let groups: Vec<&[u32]> = p.iter().collect();
        assert_eq!(groups, vec![&[38, 2, 10, 20, 30][..], &[1][..]]);
    }
}
