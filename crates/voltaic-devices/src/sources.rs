//! Independent source models: voltage and current sources.

use num_complex::Complex;
use voltaic_core::device::{
    AcBindContext, AcLoadContext, AcceptContext, BindContext, Device, LoadContext, RhsPair,
};
use voltaic_core::error::{Error, Result};
use voltaic_core::{ElemId, VecElemId};

use crate::waveforms::Waveform;

/// An independent voltage source with an optional time-varying waveform and
/// an AC stimulus magnitude/phase.
#[derive(Debug, Clone)]
pub struct VoltageSource {
    name: String,
    node_pos: String,
    node_neg: String,
    waveform: Waveform,
    ac_mag: f64,
    ac_phase_deg: f64,
    p: usize,
    n: usize,
    branch: usize,
    p_br: ElemId,
    br_p: ElemId,
    n_br: ElemId,
    br_n: ElemId,
    br_rhs: VecElemId,
    ac_p_br: ElemId,
    ac_br_p: ElemId,
    ac_n_br: ElemId,
    ac_br_n: ElemId,
    ac_br_rhs: VecElemId,
}

impl VoltageSource {
    /// A DC source.
    pub fn new(
        name: impl Into<String>,
        node_pos: impl Into<String>,
        node_neg: impl Into<String>,
        dc: f64,
    ) -> Self {
        Self::with_waveform(name, node_pos, node_neg, Waveform::dc(dc))
    }

    pub fn with_waveform(
        name: impl Into<String>,
        node_pos: impl Into<String>,
        node_neg: impl Into<String>,
        waveform: Waveform,
    ) -> Self {
        Self {
            name: name.into(),
            node_pos: node_pos.into(),
            node_neg: node_neg.into(),
            waveform,
            ac_mag: 0.0,
            ac_phase_deg: 0.0,
            p: 0,
            n: 0,
            branch: 0,
            p_br: ElemId::SINK,
            br_p: ElemId::SINK,
            n_br: ElemId::SINK,
            br_n: ElemId::SINK,
            br_rhs: VecElemId::SINK,
            ac_p_br: ElemId::SINK,
            ac_br_p: ElemId::SINK,
            ac_n_br: ElemId::SINK,
            ac_br_n: ElemId::SINK,
            ac_br_rhs: VecElemId::SINK,
        }
    }

    /// Set the small-signal stimulus (magnitude in volts, phase in degrees).
    pub fn ac(mut self, mag: f64, phase_deg: f64) -> Self {
        self.ac_mag = mag;
        self.ac_phase_deg = phase_deg;
        self
    }

    /// Index of the branch-current unknown carrying this source's current.
    pub fn branch_index(&self) -> usize {
        self.branch
    }
}

impl Device for VoltageSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn bind(&mut self, ctx: &mut BindContext) -> Result<()> {
        self.waveform.validate(&self.name)?;
        self.p = ctx.node(&self.node_pos);
        self.n = ctx.node(&self.node_neg);
        if self.p == self.n {
            return Err(Error::BadConnection {
                device: self.name.clone(),
                reason: "source shorted to itself".into(),
            });
        }
        self.branch = ctx.branch(&self.name);
        self.p_br = ctx.elem(self.p, self.branch)?;
        self.br_p = ctx.elem(self.branch, self.p)?;
        self.n_br = ctx.elem(self.n, self.branch)?;
        self.br_n = ctx.elem(self.branch, self.n)?;
        self.br_rhs = ctx.rhs_elem(self.branch);
        Ok(())
    }

    fn load(&mut self, ctx: &mut LoadContext) -> Result<()> {
        ctx.add(self.p_br, 1.0);
        ctx.add(self.br_p, 1.0);
        ctx.add(self.n_br, -1.0);
        ctx.add(self.br_n, -1.0);
        let value = if ctx.is_transient() {
            self.waveform.value_at(ctx.time)
        } else {
            self.waveform.dc_value()
        };
        ctx.add_rhs(self.br_rhs, value * ctx.state.source_factor);
        Ok(())
    }

    fn bind_ac(&mut self, ctx: &mut AcBindContext) -> Result<()> {
        self.ac_p_br = ctx.elem(self.p, self.branch)?;
        self.ac_br_p = ctx.elem(self.branch, self.p)?;
        self.ac_n_br = ctx.elem(self.n, self.branch)?;
        self.ac_br_n = ctx.elem(self.branch, self.n)?;
        self.ac_br_rhs = ctx.rhs_elem(self.branch);
        Ok(())
    }

    fn load_ac(&mut self, ctx: &mut AcLoadContext) {
        let one = Complex::new(1.0, 0.0);
        ctx.add(self.ac_p_br, one);
        ctx.add(self.ac_br_p, one);
        ctx.add(self.ac_n_br, -one);
        ctx.add(self.ac_br_n, -one);
        let phase = self.ac_phase_deg.to_radians();
        ctx.add_rhs(
            self.ac_br_rhs,
            Complex::from_polar(self.ac_mag, phase),
        );
    }

    fn accept(&mut self, ctx: &mut AcceptContext) {
        self.waveform.register_breakpoints(ctx.breakpoints, ctx.time);
    }

    fn param_names(&self) -> &'static [&'static str] {
        &["dc", "acmag", "acphase"]
    }

    fn set_param(&mut self, param: &str, value: f64) -> Result<()> {
        match param {
            "dc" => {
                self.waveform = Waveform::dc(value);
                Ok(())
            }
            "acmag" => {
                self.ac_mag = value;
                Ok(())
            }
            "acphase" => {
                self.ac_phase_deg = value;
                Ok(())
            }
            _ => Err(Error::UnknownParameter {
                device: self.name.clone(),
                param: param.into(),
            }),
        }
    }

    fn get_param(&self, param: &str) -> Option<f64> {
        match param {
            "dc" => Some(self.waveform.dc_value()),
            "acmag" => Some(self.ac_mag),
            "acphase" => Some(self.ac_phase_deg),
            _ => None,
        }
    }

    fn is_source(&self) -> bool {
        true
    }
}

/// An independent current source. Positive current flows out of `node_pos`,
/// through the source, into `node_neg`.
#[derive(Debug, Clone)]
pub struct CurrentSource {
    name: String,
    node_pos: String,
    node_neg: String,
    waveform: Waveform,
    ac_mag: f64,
    ac_phase_deg: f64,
    p: usize,
    n: usize,
    rhs: RhsPair,
    ac_rhs: RhsPair,
}

impl CurrentSource {
    pub fn new(
        name: impl Into<String>,
        node_pos: impl Into<String>,
        node_neg: impl Into<String>,
        dc: f64,
    ) -> Self {
        Self::with_waveform(name, node_pos, node_neg, Waveform::dc(dc))
    }

    pub fn with_waveform(
        name: impl Into<String>,
        node_pos: impl Into<String>,
        node_neg: impl Into<String>,
        waveform: Waveform,
    ) -> Self {
        Self {
            name: name.into(),
            node_pos: node_pos.into(),
            node_neg: node_neg.into(),
            waveform,
            ac_mag: 0.0,
            ac_phase_deg: 0.0,
            p: 0,
            n: 0,
            rhs: RhsPair::UNBOUND,
            ac_rhs: RhsPair::UNBOUND,
        }
    }

    pub fn ac(mut self, mag: f64, phase_deg: f64) -> Self {
        self.ac_mag = mag;
        self.ac_phase_deg = phase_deg;
        self
    }
}

impl Device for CurrentSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn bind(&mut self, ctx: &mut BindContext) -> Result<()> {
        self.waveform.validate(&self.name)?;
        self.p = ctx.node(&self.node_pos);
        self.n = ctx.node(&self.node_neg);
        self.rhs = RhsPair::bind(ctx.rhs, self.p, self.n);
        Ok(())
    }

    fn load(&mut self, ctx: &mut LoadContext) -> Result<()> {
        let value = if ctx.is_transient() {
            self.waveform.value_at(ctx.time)
        } else {
            self.waveform.dc_value()
        };
        self.rhs.stamp(ctx.rhs, value * ctx.state.source_factor);
        Ok(())
    }

    fn bind_ac(&mut self, ctx: &mut AcBindContext) -> Result<()> {
        self.ac_rhs = RhsPair::bind(ctx.rhs, self.p, self.n);
        Ok(())
    }

    fn load_ac(&mut self, ctx: &mut AcLoadContext) {
        let phase = self.ac_phase_deg.to_radians();
        self.ac_rhs
            .stamp(ctx.rhs, Complex::from_polar(self.ac_mag, phase));
    }

    fn accept(&mut self, ctx: &mut AcceptContext) {
        self.waveform.register_breakpoints(ctx.breakpoints, ctx.time);
    }

    fn param_names(&self) -> &'static [&'static str] {
        &["dc", "acmag", "acphase"]
    }

    fn set_param(&mut self, param: &str, value: f64) -> Result<()> {
        match param {
            "dc" => {
                self.waveform = Waveform::dc(value);
                Ok(())
            }
            "acmag" => {
                self.ac_mag = value;
                Ok(())
            }
            "acphase" => {
                self.ac_phase_deg = value;
                Ok(())
            }
            _ => Err(Error::UnknownParameter {
                device: self.name.clone(),
                param: param.into(),
            }),
        }
    }

    fn get_param(&self, param: &str) -> Option<f64> {
        match param {
            "dc" => Some(self.waveform.dc_value()),
            "acmag" => Some(self.ac_mag),
            "acphase" => Some(self.ac_phase_deg),
            _ => None,
        }
    }

    fn is_source(&self) -> bool {
        true
    }
}
