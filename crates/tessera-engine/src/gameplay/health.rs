use tessera_core::component::Component;

/// Hit points, clamped to `0..=max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Health {
    current: i32,
    max: i32,
}

impl Health {
    pub fn new(max: i32) -> Self {
        let max = max.max(1);
        Self { current: max, max }
    }

    /// Start below (or above) full; `max` grows to fit.
    pub fn with_current(max: i32, current: i32) -> Self {
        let current = current.max(0);
        Self {
            current,
            max: max.max(current).max(1),
        }
    }

    pub fn current(&self) -> i32 {
        self.current
    }

    pub fn max(&self) -> i32 {
        self.max
    }

    pub fn is_dead(&self) -> bool {
        self.current == 0
    }

    pub fn ratio(&self) -> f64 {
        f64::from(self.current) / f64::from(self.max)
    }

    /// Subtract `amount`. Returns `true` only on the hit that drops health to zero.
    pub fn damage(&mut self, amount: i32) -> bool {
        if self.is_dead() {
            return false;
        }
        self.current = (self.current - amount.max(0)).max(0);
        self.is_dead()
    }

    pub fn heal(&mut self, amount: i32) {
        self.current = (self.current + amount.max(0)).min(self.max);
    }
}

impl Component for Health {}
