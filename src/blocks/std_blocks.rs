use crate::blocks::registry::{BlockBehavior, BlockRegistry, BlockRole, BlockSignature, Params, PortSpec};
use crate::compile::lower::{LowerCtx, LowerError};
use crate::domain::element::FieldSource;
use crate::foundation::core::{Color, Vec2};
use crate::foundation::ids::{DomainIdx, FieldId};
use crate::ir::field::MapOp;
use crate::ir::program::TimeModel;
use crate::ir::signal::{BinaryOp, TimeChannel, UnaryOp};
use crate::types::adapter::AdapterOp;
use crate::types::descriptor::{Domain, TypeDesc};
use crate::types::value::Value;

pub(crate) fn register_all(r: &mut BlockRegistry) {
    r.register("time_root", Box::new(TimeRoot));
    r.register("constant", Box::new(Constant));
    r.register("add", Box::new(Arith(BinaryOp::Add)));
    r.register("subtract", Box::new(Arith(BinaryOp::Sub)));
    r.register("multiply", Box::new(Arith(BinaryOp::Mul)));
    r.register("min", Box::new(Arith(BinaryOp::Min)));
    r.register("max", Box::new(Arith(BinaryOp::Max)));
    r.register("oscillator", Box::new(Oscillator));
    r.register("hue_color", Box::new(HueColor));
    r.register("vec2", Box::new(MakeVec2));
    r.register("integrate", Box::new(Integrate));
    r.register("delay", Box::new(Delay));
    r.register("element_domain", Box::new(LineDomain));
    r.register("grid_domain", Box::new(GridDomain));
    r.register("field_broadcast", Box::new(Broadcast(Domain::Number)));
    r.register("field_broadcast_vec2", Box::new(Broadcast(Domain::Vec2)));
    r.register("field_broadcast_color", Box::new(Broadcast(Domain::Color)));
    r.register("field_map", Box::new(FieldMap));
    r.register("field_zip", Box::new(FieldZip));
    r.register("field_hue", Box::new(FieldHue));
    r.register("render_instances", Box::new(RenderInstances));
    r.register("instances", Box::new(Instances));
}

fn parse_domain(s: &str) -> Result<Domain, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "number" => Ok(Domain::Number),
        "phase" => Ok(Domain::Phase),
        "time" => Ok(Domain::Time),
        "vec2" => Ok(Domain::Vec2),
        "color" => Ok(Domain::Color),
        other => Err(format!("unknown value domain '{other}'")),
    }
}

fn zero(d: Domain) -> Result<Value, String> {
    Value::zero(d).ok_or_else(|| format!("domain '{}' has no value", d.name()))
}

fn positive(params: &Params<'_>, name: &str, default: f64) -> Result<f64, String> {
    let v = params.f64(name, default)?;
    if v > 0.0 {
        Ok(v)
    } else {
        Err(format!("param '{name}' must be > 0 (got {v})"))
    }
}

/// The patch's time authority.
struct TimeRoot;

impl TimeRoot {
    fn model(params: &Params<'_>) -> Result<TimeModel, String> {
        match params.str("mode", "cyclic")?.trim().to_ascii_lowercase().as_str() {
            "cyclic" | "loop" => Ok(TimeModel::Cyclic {
                period: positive(params, "period", 1.0)?,
            }),
            "infinite" => Ok(TimeModel::Infinite {
                period: positive(params, "period", 1.0)?,
            }),
            "finite" | "once" => Ok(TimeModel::Finite {
                duration: positive(params, "duration", 1.0)?,
            }),
            other => Err(format!("unknown time mode '{other}'")),
        }
    }
}

impl BlockBehavior for TimeRoot {
    fn signature(&self, params: &Params<'_>) -> Result<BlockSignature, String> {
        let mut sig = BlockSignature::new(BlockRole::TimeRoot)
            .output(PortSpec::new("time", TypeDesc::signal(Domain::Time)))
            .output(PortSpec::new("phase", TypeDesc::signal(Domain::Phase)))
            .output(PortSpec::new("wrap", TypeDesc::event()));
        sig.time_model = Some(Self::model(params)?);
        Ok(sig)
    }

    fn lower(&self, cx: &mut LowerCtx<'_>) -> Result<(), LowerError> {
        let time = cx.time(TimeChannel::Time)?;
        let phase = cx.time(TimeChannel::Phase)?;
        let wrap = cx.time(TimeChannel::Wrap)?;
        cx.output_sig("time", time)?;
        cx.output_sig("phase", phase)?;
        cx.output_sig("wrap", wrap)
    }
}

struct Constant;

impl Constant {
    fn value(params: &Params<'_>) -> Result<Value, String> {
        match params.value("value")? {
            Some(v @ Value::Trigger(_)) => Err(format!("constant cannot hold {v:?}")),
            Some(v) => Ok(v),
            None => Err("param 'value' is required".to_owned()),
        }
    }
}

impl BlockBehavior for Constant {
    fn signature(&self, params: &Params<'_>) -> Result<BlockSignature, String> {
        let v = Self::value(params)?;
        Ok(BlockSignature::new(BlockRole::Pure)
            .output(PortSpec::new("out", TypeDesc::signal(v.domain()))))
    }

    fn lower(&self, cx: &mut LowerCtx<'_>) -> Result<(), LowerError> {
        let v = Self::value(&cx.params())?;
        let out = cx.constant(v)?;
        cx.output_sig("out", out)
    }
}

/// Two-input arithmetic over one value domain (param `domain`, default number).
struct Arith(BinaryOp);

impl Arith {
    fn domain(&self, params: &Params<'_>) -> Result<Domain, String> {
        let d = parse_domain(params.str("domain", "number")?)?;
        if self.0.accepts(d) {
            Ok(d)
        } else {
            Err(format!("{:?} is not defined for {}", self.0, d.name()))
        }
    }

    fn identity(&self, d: Domain) -> Result<Value, String> {
        let z = zero(d)?;
        if self.0 == BinaryOp::Mul {
            return z
                .map_components(|_| 1.0)
                .ok_or_else(|| format!("no multiplicative identity for {}", d.name()));
        }
        Ok(z)
    }
}

impl BlockBehavior for Arith {
    fn signature(&self, params: &Params<'_>) -> Result<BlockSignature, String> {
        let d = self.domain(params)?;
        let ty = TypeDesc::signal(d);
        Ok(BlockSignature::new(BlockRole::Pure)
            .input(PortSpec::new("a", ty).with_default(zero(d)?))
            .input(PortSpec::new("b", ty).with_default(self.identity(d)?))
            .output(PortSpec::new("out", ty)))
    }

    fn lower(&self, cx: &mut LowerCtx<'_>) -> Result<(), LowerError> {
        let a = cx.input_sig("a")?;
        let b = cx.input_sig("b")?;
        let out = cx.binary(self.0, a, b)?;
        cx.output_sig("out", out)
    }
}

struct Oscillator;

impl Oscillator {
    fn shape(params: &Params<'_>) -> Result<UnaryOp, String> {
        match params.str("shape", "sine")?.trim().to_ascii_lowercase().as_str() {
            "sine" | "sin" => Ok(UnaryOp::Sine),
            "triangle" | "tri" => Ok(UnaryOp::Triangle),
            "saw" | "sawtooth" => Ok(UnaryOp::Saw),
            other => Err(format!("unknown oscillator shape '{other}'")),
        }
    }
}

impl BlockBehavior for Oscillator {
    fn signature(&self, params: &Params<'_>) -> Result<BlockSignature, String> {
        Self::shape(params)?;
        Ok(BlockSignature::new(BlockRole::Pure)
            .input(PortSpec::new("phase", TypeDesc::signal(Domain::Phase)).with_default(Value::Phase(0.0)))
            .input(
                PortSpec::new("amplitude", TypeDesc::signal(Domain::Number))
                    .with_default(Value::Number(1.0)),
            )
            .output(PortSpec::new("out", TypeDesc::signal(Domain::Number))))
    }

    fn lower(&self, cx: &mut LowerCtx<'_>) -> Result<(), LowerError> {
        let op = Self::shape(&cx.params())?;
        let phase = cx.input_sig("phase")?;
        let amp = cx.input_sig("amplitude")?;
        let wave = cx.unary(op, phase)?;
        let out = cx.binary(BinaryOp::Mul, wave, amp)?;
        cx.output_sig("out", out)
    }
}

fn hue_op(params: &Params<'_>) -> Result<UnaryOp, String> {
    Ok(UnaryOp::Hue {
        saturation: params.f64("saturation", 1.0)?.clamp(0.0, 1.0),
        value: params.f64("value", 1.0)?.clamp(0.0, 1.0),
    })
}

struct HueColor;

impl BlockBehavior for HueColor {
    fn signature(&self, params: &Params<'_>) -> Result<BlockSignature, String> {
        hue_op(params)?;
        Ok(BlockSignature::new(BlockRole::Pure)
            .input(PortSpec::new("hue", TypeDesc::signal(Domain::Phase)).with_default(Value::Phase(0.0)))
            .output(PortSpec::new("out", TypeDesc::signal(Domain::Color))))
    }

    fn lower(&self, cx: &mut LowerCtx<'_>) -> Result<(), LowerError> {
        let op = hue_op(&cx.params())?;
        let hue = cx.input_sig("hue")?;
        let out = cx.unary(op, hue)?;
        cx.output_sig("out", out)
    }
}

struct MakeVec2;

impl BlockBehavior for MakeVec2 {
    fn signature(&self, _params: &Params<'_>) -> Result<BlockSignature, String> {
        let num = TypeDesc::signal(Domain::Number);
        Ok(BlockSignature::new(BlockRole::Pure)
            .input(PortSpec::new("x", num).with_default(Value::Number(0.0)))
            .input(PortSpec::new("y", num).with_default(Value::Number(0.0)))
            .output(PortSpec::new("out", TypeDesc::signal(Domain::Vec2))))
    }

    fn lower(&self, cx: &mut LowerCtx<'_>) -> Result<(), LowerError> {
        let x = cx.input_sig("x")?;
        let y = cx.input_sig("y")?;
        let out = cx.pack_vec2(x, y)?;
        cx.output_sig("out", out)
    }
}

/// Running sum of `rate * dt`. Keeps its memory across frames and hot swaps.
struct Integrate;

impl BlockBehavior for Integrate {
    fn signature(&self, params: &Params<'_>) -> Result<BlockSignature, String> {
        params.f64("initial", 0.0)?;
        Ok(BlockSignature::new(BlockRole::Stateful)
            .input(
                PortSpec::new("rate", TypeDesc::signal(Domain::Number))
                    .with_default(Value::Number(0.0)),
            )
            .output(PortSpec::new("out", TypeDesc::signal(Domain::Number))))
    }

    fn lower(&self, cx: &mut LowerCtx<'_>) -> Result<(), LowerError> {
        let initial = cx.params().f64("initial", 0.0)?;
        let rate = cx.input_sig("rate")?;
        let state = cx.state("out", Value::Number(initial))?;
        let out = cx.integrate(state, rate)?;
        cx.output_sig("out", out)
    }
}

/// One-frame delay. Its input is a memory boundary, so it may close a feedback loop.
struct Delay;

impl Delay {
    fn initial(params: &Params<'_>) -> Result<Value, String> {
        let d = parse_domain(params.str("domain", "number")?)?;
        match params.value("initial")? {
            Some(v) if v.domain() != d => Err(format!(
                "initial value is {} but the delay carries {}",
                v.domain().name(),
                d.name()
            )),
            Some(v) => Ok(v),
            None => zero(d),
        }
    }
}

impl BlockBehavior for Delay {
    fn signature(&self, params: &Params<'_>) -> Result<BlockSignature, String> {
        let init = Self::initial(params)?;
        let ty = TypeDesc::signal(init.domain());
        Ok(BlockSignature::new(BlockRole::Stateful)
            .input(PortSpec::new("in", ty).with_default(init).memory())
            .output(PortSpec::new("out", ty)))
    }

    fn lower(&self, cx: &mut LowerCtx<'_>) -> Result<(), LowerError> {
        let init = Self::initial(&cx.params())?;
        let state = cx.state("out", init)?;
        let out = cx.delay(state)?;
        cx.output_sig("out", out)?;
        let input = cx.input_sig("in")?;
        cx.state_write(state, input)
    }
}

struct LineDomain;

impl BlockBehavior for LineDomain {
    fn signature(&self, params: &Params<'_>) -> Result<BlockSignature, String> {
        params.u32("count", 1)?;
        Ok(BlockSignature::new(BlockRole::DomainSource)
            .output(PortSpec::new("domain", TypeDesc::elements()))
            .output(PortSpec::new("index", TypeDesc::field(Domain::Number)))
            .output(PortSpec::new("random", TypeDesc::field(Domain::Number))))
    }

    fn lower(&self, cx: &mut LowerCtx<'_>) -> Result<(), LowerError> {
        let count = cx.params().u32("count", 1)?;
        let d = cx.line_domain(count)?;
        let index = cx.field_source(d, FieldSource::Index)?;
        let random = cx.field_source(d, FieldSource::Random)?;
        cx.output_domain("domain", d)?;
        cx.output_field("index", index)?;
        cx.output_field("random", random)
    }
}

struct GridDomain;

impl BlockBehavior for GridDomain {
    fn signature(&self, params: &Params<'_>) -> Result<BlockSignature, String> {
        params.u32("rows", 1)?;
        params.u32("cols", 1)?;
        positive(params, "spacing", 1.0)?;
        Ok(BlockSignature::new(BlockRole::DomainSource)
            .output(PortSpec::new("domain", TypeDesc::elements()))
            .output(PortSpec::new("position", TypeDesc::field(Domain::Vec2)))
            .output(PortSpec::new("index", TypeDesc::field(Domain::Number))))
    }

    fn lower(&self, cx: &mut LowerCtx<'_>) -> Result<(), LowerError> {
        let p = cx.params();
        let (rows, cols) = (p.u32("rows", 1)?, p.u32("cols", 1)?);
        let spacing = positive(&p, "spacing", 1.0)?;
        let d = cx.grid_domain(rows, cols, spacing)?;
        let position = cx.field_source(d, FieldSource::Position)?;
        let index = cx.field_source(d, FieldSource::Index)?;
        cx.output_domain("domain", d)?;
        cx.output_field("position", position)?;
        cx.output_field("index", index)
    }
}

/// Repeat a signal's current value at every element of a domain.
struct Broadcast(Domain);

impl BlockBehavior for Broadcast {
    fn signature(&self, _params: &Params<'_>) -> Result<BlockSignature, String> {
        Ok(BlockSignature::new(BlockRole::Pure)
            .input(PortSpec::new("domain", TypeDesc::elements()))
            .input(PortSpec::new("value", TypeDesc::signal(self.0)).with_default(zero(self.0)?))
            .output(PortSpec::new("out", TypeDesc::field(self.0))))
    }

    fn lower(&self, cx: &mut LowerCtx<'_>) -> Result<(), LowerError> {
        let domain = cx.input_domain("domain")?;
        let sig = cx.input_sig("value")?;
        let out = cx.broadcast(domain, sig)?;
        cx.output_field("out", out)
    }
}

struct FieldMap;

impl FieldMap {
    fn op(params: &Params<'_>) -> Result<MapOp, String> {
        let k = params.f64("k", 1.0)?;
        match params.str("op", "scale")?.trim().to_ascii_lowercase().as_str() {
            "neg" => Ok(MapOp::Unary(UnaryOp::Neg)),
            "abs" => Ok(MapOp::Unary(UnaryOp::Abs)),
            "fract" => Ok(MapOp::Unary(UnaryOp::Fract)),
            "scale" => Ok(MapOp::Adapter(AdapterOp::Scale { k })),
            "offset" => Ok(MapOp::Adapter(AdapterOp::Offset { k })),
            other => Err(format!("unknown field_map op '{other}'")),
        }
    }
}

impl BlockBehavior for FieldMap {
    fn signature(&self, params: &Params<'_>) -> Result<BlockSignature, String> {
        Self::op(params)?;
        let ty = TypeDesc::field(Domain::Number);
        Ok(BlockSignature::new(BlockRole::Pure)
            .input(PortSpec::new("in", ty).with_default(Value::Number(0.0)))
            .output(PortSpec::new("out", ty)))
    }

    fn lower(&self, cx: &mut LowerCtx<'_>) -> Result<(), LowerError> {
        let op = Self::op(&cx.params())?;
        let input = cx.input_field("in")?;
        let out = cx.field_map(input, op)?;
        cx.output_field("out", out)
    }
}

struct FieldZip;

impl FieldZip {
    fn op(params: &Params<'_>) -> Result<BinaryOp, String> {
        match params.str("op", "add")?.trim().to_ascii_lowercase().as_str() {
            "add" => Ok(BinaryOp::Add),
            "sub" | "subtract" => Ok(BinaryOp::Sub),
            "mul" | "multiply" => Ok(BinaryOp::Mul),
            "min" => Ok(BinaryOp::Min),
            "max" => Ok(BinaryOp::Max),
            other => Err(format!("unknown field_zip op '{other}'")),
        }
    }
}

impl BlockBehavior for FieldZip {
    fn signature(&self, params: &Params<'_>) -> Result<BlockSignature, String> {
        Self::op(params)?;
        let ty = TypeDesc::field(Domain::Number);
        Ok(BlockSignature::new(BlockRole::Pure)
            .input(PortSpec::new("a", ty).with_default(Value::Number(0.0)))
            .input(PortSpec::new("b", ty).with_default(Value::Number(0.0)))
            .output(PortSpec::new("out", ty)))
    }

    fn lower(&self, cx: &mut LowerCtx<'_>) -> Result<(), LowerError> {
        let op = Self::op(&cx.params())?;
        let a = cx.input_field("a")?;
        let b = cx.input_field("b")?;
        let out = cx.field_zip(a, b, op)?;
        cx.output_field("out", out)
    }
}

struct FieldHue;

impl BlockBehavior for FieldHue {
    fn signature(&self, params: &Params<'_>) -> Result<BlockSignature, String> {
        hue_op(params)?;
        Ok(BlockSignature::new(BlockRole::Pure)
            .input(PortSpec::new("hue", TypeDesc::field(Domain::Number)).with_default(Value::Number(0.0)))
            .output(PortSpec::new("out", TypeDesc::field(Domain::Color))))
    }

    fn lower(&self, cx: &mut LowerCtx<'_>) -> Result<(), LowerError> {
        let op = hue_op(&cx.params())?;
        let input = cx.input_field("hue")?;
        let hue = cx.field_map(input, MapOp::Adapter(AdapterOp::NumberToPhase))?;
        let out = cx.field_map(hue, MapOp::Unary(op))?;
        cx.output_field("out", out)
    }
}

fn render_defaults() -> [(&'static str, Domain, Value); 4] {
    [
        ("position", Domain::Vec2, Value::Vec2(Vec2::ZERO)),
        ("radius", Domain::Number, Value::Number(1.0)),
        ("color", Domain::Color, Value::Color(Color::WHITE)),
        ("opacity", Domain::Number, Value::Number(1.0)),
    ]
}

/// Draws one instance per element of its domain.
struct RenderInstances;

impl BlockBehavior for RenderInstances {
    fn signature(&self, _params: &Params<'_>) -> Result<BlockSignature, String> {
        let mut sig = BlockSignature::new(BlockRole::RenderSink)
            .input(PortSpec::new("domain", TypeDesc::elements()));
        for (name, d, v) in render_defaults() {
            sig = sig.input(PortSpec::new(name, TypeDesc::field(d)).with_default(v));
        }
        Ok(sig)
    }

    fn lower(&self, cx: &mut LowerCtx<'_>) -> Result<(), LowerError> {
        let domain = cx.input_domain("domain")?;
        let position = cx.input_field("position")?;
        let radius = cx.input_field("radius")?;
        let color = cx.input_field("color")?;
        let opacity = cx.input_field("opacity")?;
        cx.render_sink(domain, position, radius, color, opacity)
    }
}

fn broadcast_input(
    cx: &mut LowerCtx<'_>,
    domain: DomainIdx,
    port: &str,
    d: Domain,
) -> Result<FieldId, LowerError> {
    let sig = cx.input_sig(port)?;
    let out = cx.broadcast(domain, sig)?;
    if cx.field_type(out).domain != d {
        return Err(format!("input '{port}' must be {}", d.name()).into());
    }
    Ok(out)
}

/// A line of `count` elements drawn with per-frame signal styling.
///
/// Generates its own domain, so a single block covers the whole field path.
struct Instances;

impl BlockBehavior for Instances {
    fn signature(&self, params: &Params<'_>) -> Result<BlockSignature, String> {
        params.u32("count", 1)?;
        let mut sig = BlockSignature::new(BlockRole::RenderSink)
            .output(PortSpec::new("domain", TypeDesc::elements()));
        for (name, d, v) in render_defaults().into_iter().skip(1) {
            sig = sig.input(PortSpec::new(name, TypeDesc::signal(d)).with_default(v));
        }
        Ok(sig)
    }

    fn lower(&self, cx: &mut LowerCtx<'_>) -> Result<(), LowerError> {
        let count = cx.params().u32("count", 1)?;
        let domain = cx.line_domain(count)?;
        let position = cx.field_source(domain, FieldSource::Position)?;
        let radius = broadcast_input(cx, domain, "radius", Domain::Number)?;
        let color = broadcast_input(cx, domain, "color", Domain::Color)?;
        let opacity = broadcast_input(cx, domain, "opacity", Domain::Number)?;
        cx.render_sink(domain, position, radius, color, opacity)?;
        cx.output_domain("domain", domain)
    }
}
