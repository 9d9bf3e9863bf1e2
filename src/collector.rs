// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Result collectors for multicast dispatch.
//!
//! A collector sees every receiver's return value in subscription order,
//! decides whether the broadcast goes on, and produces the final result.

/// Aggregation policy for one broadcast.
///
/// A fresh collector is created for every `dispatch` call.
pub trait Collector<R> {
    type Output;

    /// Feeds one receiver result. Returning `false` stops the broadcast.
    fn collect(&mut self, result: R) -> bool;

    /// Final result once the walk is over (complete or cut short).
    fn finish(self) -> Self::Output;
}

/// Keeps the last result. Never stops the broadcast.
#[derive(Debug, Clone, Default)]
pub struct CollectLast<R> {
    result: R,
}

impl<R> Collector<R> for CollectLast<R> {
    type Output = R;

    fn collect(&mut self, result: R) -> bool {
        self.result = result;
        true
    }

    fn finish(self) -> R {
        self.result
    }
}

/// Default collector. For `()` receivers this is a plain broadcast.
pub type CollectDefault<R> = CollectLast<R>;

/// Continues while receivers return `true`.
///
/// The first `false` stops the broadcast and becomes the result, which makes
/// this the veto policy. Zero receivers means nobody objected: `true`.
#[derive(Debug, Clone)]
pub struct CollectWhileTrue {
    result: bool,
}

impl Default for CollectWhileTrue {
    fn default() -> Self {
        Self { result: true }
    }
}

impl Collector<bool> for CollectWhileTrue {
    type Output = bool;

    fn collect(&mut self, result: bool) -> bool {
        self.result = result;
        result
    }

    fn finish(self) -> bool {
        self.result
    }
}

/// Continues while receivers return `false`. The first `true` wins.
#[derive(Debug, Clone, Default)]
pub struct CollectWhileFalse {
    result: bool,
}

impl Collector<bool> for CollectWhileFalse {
    type Output = bool;

    fn collect(&mut self, result: bool) -> bool {
        self.result = result;
        !result
    }

    fn finish(self) -> bool {
        self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run<C: Collector<R> + Default, R>(results: Vec<R>) -> (C::Output, usize) {
        let mut collector = C::default();
        let mut fed = 0;
        for result in results {
            fed += 1;
            if !collector.collect(result) {
                break;
            }
        }
        (collector.finish(), fed)
    }

    #[test]
    fn test_collect_last() {
        assert_eq!(run::<CollectLast<i32>, _>(vec![1, 2, 3]), (3, 3));
        assert_eq!(run::<CollectLast<i32>, _>(vec![]), (0, 0));
        assert_eq!(run::<CollectDefault<()>, _>(vec![(), ()]), ((), 2));
    }

    #[test]
    fn test_collect_while_true_vetoes() {
        assert_eq!(run::<CollectWhileTrue, _>(vec![true, false, true]), (false, 2));
        assert_eq!(run::<CollectWhileTrue, _>(vec![true, true]), (true, 2));
        assert_eq!(run::<CollectWhileTrue, _>(vec![]), (true, 0));
    }

    #[test]
    fn test_collect_while_false() {
        assert_eq!(run::<CollectWhileFalse, _>(vec![false, true, false]), (true, 2));
        assert_eq!(run::<CollectWhileFalse, _>(vec![false, false]), (false, 2));
        assert_eq!(run::<CollectWhileFalse, _>(vec![]), (false, 0));
    }
}
