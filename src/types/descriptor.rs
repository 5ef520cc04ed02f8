use std::fmt;

/// Evaluation tier of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum World {
    /// Compile-time constant.
    Scalar,
    /// One value per frame.
    Signal,
    /// One value per element, evaluated lazily.
    Field,
    /// Discrete trigger, fired or not on a given frame.
    Event,
}

/// Semantic subtype of a value within its world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Number,
    /// Cyclic position in `[0, 1)`.
    Phase,
    /// Seconds.
    Time,
    Vec2,
    Color,
    Trigger,
    /// Handle to an element domain.
    Elements,
}

impl Domain {
    /// Number of `f64` components one value of this domain occupies.
    pub fn arity(self) -> usize {
        match self {
            Domain::Vec2 => 2,
            Domain::Color => 4,
            Domain::Number | Domain::Phase | Domain::Time | Domain::Trigger | Domain::Elements => 1,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Domain::Number | Domain::Time)
    }

    pub fn name(self) -> &'static str {
        match self {
            Domain::Number => "number",
            Domain::Phase => "phase",
            Domain::Time => "time",
            Domain::Vec2 => "vec2",
            Domain::Color => "color",
            Domain::Trigger => "trigger",
            Domain::Elements => "elements",
        }
    }
}

/// `{world, domain}` plus the element arity derived from the domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct TypeDesc {
    pub world: World,
    pub domain: Domain,
}

impl TypeDesc {
    pub const fn new(world: World, domain: Domain) -> Self {
        Self { world, domain }
    }

    pub const fn signal(domain: Domain) -> Self {
        Self::new(World::Signal, domain)
    }

    pub const fn field(domain: Domain) -> Self {
        Self::new(World::Field, domain)
    }

    pub const fn scalar(domain: Domain) -> Self {
        Self::new(World::Scalar, domain)
    }

    pub const fn event() -> Self {
        Self::new(World::Event, Domain::Trigger)
    }

    pub const fn elements() -> Self {
        Self::new(World::Scalar, Domain::Elements)
    }

    pub fn element_arity(self) -> usize {
        self.domain.arity()
    }

    /// Structural validity: triggers live only in the event world, element handles only as
    /// scalars.
    pub fn is_well_formed(self) -> bool {
        match (self.world, self.domain) {
            (World::Event, Domain::Trigger) => true,
            (World::Event, _) | (_, Domain::Trigger) => false,
            (World::Scalar, Domain::Elements) => true,
            (_, Domain::Elements) => false,
            _ => true,
        }
    }

    /// Whether a value of type `self` may drive an input of type `dst` without an adapter.
    ///
    /// The only implicit step is scalar-to-signal promotion of a constant; domains never
    /// convert implicitly.
    pub fn can_drive(self, dst: TypeDesc) -> bool {
        if self.domain != dst.domain {
            return false;
        }
        self.world == dst.world || (self.world == World::Scalar && dst.world == World::Signal)
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let w = match self.world {
            World::Scalar => "scalar",
            World::Signal => "signal",
            World::Field => "field",
            World::Event => "event",
        };
        write!(f, "{w}<{}>", self.domain.name())
    }
}
