/*
 * 随机数生成器
 * 可指定种子复现抽取序列，提供均匀选择与按权重选择
 */

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// 可复现的随机数生成器
#[derive(Debug, Clone)]
pub struct RandomGenerator {
    rng: ChaCha8Rng,
    seed: u64,
    /// 总生成次数
    total_generations: u64,
}

#[derive(Debug, Clone)]
pub struct WeightedItem<T> {
    pub item: T,
    pub weight: f64,
}

impl<T> WeightedItem<T> {
    pub fn new(item: T, weight: f64) -> Self {
        Self { item, weight }
    }
}

impl RandomGenerator {
    /// 创建新的随机数生成器
    pub fn new() -> Self {
        Self::with_seed(rand::random::<u64>())
    }

    /// 使用指定种子创建
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
            total_generations: 0,
        }
    }

    /// 有种子时复现，否则随机
    pub fn from_optional_seed(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::new, Self::with_seed)
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn total_generations(&self) -> u64 {
        self.total_generations
    }

    /// 生成 [min, max) 之间的浮点数
    pub fn range_f64(&mut self, min: f64, max: f64) -> f64 {
        self.total_generations += 1;
        self.rng.gen_range(min..max)
    }

    /// 从切片中随机选择一个元素
    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }

        self.total_generations += 1;
        items.choose(&mut self.rng)
    }

    /// 轮盘赌选择：在 [0, 总权重) 抽一个值，第一个累计权重不小于它的元素胜出。
    /// 非正数或非有限的权重不参与。
    pub fn weighted_choose<'a, T>(&mut self, items: &'a [WeightedItem<T>]) -> Option<&'a T> {
        let usable = |item: &&WeightedItem<T>| item.weight.is_finite() && item.weight > 0.0;

        let total_weight: f64 = items.iter().filter(usable).map(|item| item.weight).sum();
        if total_weight <= 0.0 || !total_weight.is_finite() {
            return None;
        }

        let draw = self.range_f64(0.0, total_weight);
        let mut cumulative = 0.0;

        for item in items.iter().filter(usable) {
            cumulative += item.weight;
            if draw <= cumulative {
                return Some(&item.item);
            }
        }

        // 浮点误差兜底：返回最后一个可用元素
        items.iter().filter(usable).last().map(|item| &item.item)
    }
}

impl Default for RandomGenerator {
    fn default() -> Self {
        Self::new()
    }
}
