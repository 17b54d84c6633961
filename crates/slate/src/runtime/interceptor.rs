// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use super::Value;

pub const PLACE: &str = "place";
pub const REMOVE: &str = "remove";
pub const SAFE: &str = "safe";

pub fn is_primitive(name: &str) -> bool {
    matches!(name, PLACE | REMOVE | SAFE)
}

#[derive(Debug, Default)]
pub struct InterceptorSet {
    records: Vec<(i64, i64)>,
    observed_any: bool,
}

impl InterceptorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_place(&mut self, row: i64, col: i64) {
        self.observed_any = true;
        self.records.push((row, col));
    }

    // Retracts the latest matching placement, the way a backtracking search
    // undoes the decision it just made.
    pub fn record_remove(&mut self, row: i64, col: i64) {
        self.observed_any = true;
        if let Some(pos) = self.records.iter().rposition(|&r| r == (row, col)) {
            self.records.remove(pos);
        }
    }

    pub fn records(&self) -> &[(i64, i64)] {
        &self.records
    }

    pub fn has_observed_any(&self) -> bool {
        self.observed_any
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.observed_any = false;
    }

    pub fn to_value(&self) -> Value {
        Value::array(
            self.records
                .iter()
                .map(|&(row, col)| {
                    Value::array(vec![Value::Number(row as f64), Value::Number(col as f64)])
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_retracts_latest_matching_entry() {
        let mut set = InterceptorSet::new();
        set.record_place(0, 1);
        set.record_place(1, 3);
        set.record_place(0, 1);
        set.record_remove(0, 1);
        assert_eq!(set.records(), &[(0, 1), (1, 3)]);
        assert!(set.has_observed_any());
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut set = InterceptorSet::new();
        set.record_place(2, 2);
        set.clear();
        assert!(set.is_empty());
        assert!(!set.has_observed_any());
    }
}
