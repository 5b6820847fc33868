//! The four controlled source kinds: VCVS (E), VCCS (G), CCCS (F), CCVS (H).
//!
//! Current-controlled sources reference the branch current of an
//! independent voltage source by name; the branch variable is claimed at
//! bind time, so device ordering inside the circuit does not matter.

use num_complex::Complex;
use voltaic_core::device::{AcBindContext, AcLoadContext, BindContext, Device, LoadContext};
use voltaic_core::error::{Error, Result};
use voltaic_core::ElemId;

/// Voltage-controlled voltage source: `V(out) = gain · V(ctrl)`.
#[derive(Debug, Clone)]
pub struct Vcvs {
    name: String,
    out_pos: String,
    out_neg: String,
    ctrl_pos: String,
    ctrl_neg: String,
    gain: f64,
    branch: usize,
    elems: [ElemId; 6],
    ac_elems: [ElemId; 6],
    pins: [usize; 4],
}

impl Vcvs {
    pub fn new(
        name: impl Into<String>,
        out_pos: impl Into<String>,
        out_neg: impl Into<String>,
        ctrl_pos: impl Into<String>,
        ctrl_neg: impl Into<String>,
        gain: f64,
    ) -> Self {
        Self {
            name: name.into(),
            out_pos: out_pos.into(),
            out_neg: out_neg.into(),
            ctrl_pos: ctrl_pos.into(),
            ctrl_neg: ctrl_neg.into(),
            gain,
            branch: 0,
            elems: [ElemId::SINK; 6],
            ac_elems: [ElemId::SINK; 6],
            pins: [0; 4],
        }
    }

    fn bind_elems(
        &self,
        mut elem: impl FnMut(usize, usize) -> Result<ElemId>,
    ) -> Result<[ElemId; 6]> {
        let [op, on, cp, cn] = self.pins;
        let br = self.branch;
        Ok([
            elem(op, br)?,
            elem(on, br)?,
            elem(br, op)?,
            elem(br, on)?,
            elem(br, cp)?,
            elem(br, cn)?,
        ])
    }

    fn values(&self) -> [f64; 6] {
        [1.0, -1.0, 1.0, -1.0, -self.gain, self.gain]
    }
}

impl Device for Vcvs {
    fn name(&self) -> &str {
        &self.name
    }

    fn bind(&mut self, ctx: &mut BindContext) -> Result<()> {
        self.pins = [
            ctx.node(&self.out_pos),
            ctx.node(&self.out_neg),
            ctx.node(&self.ctrl_pos),
            ctx.node(&self.ctrl_neg),
        ];
        self.branch = ctx.branch(&self.name);
        self.elems = self.bind_elems(|r, c| ctx.matrix.get_element(r, c))?;
        Ok(())
    }

    fn load(&mut self, ctx: &mut LoadContext) -> Result<()> {
        for (id, v) in self.elems.iter().zip(self.values()) {
            ctx.matrix[*id] += v;
        }
        Ok(())
    }

    fn bind_ac(&mut self, ctx: &mut AcBindContext) -> Result<()> {
        self.ac_elems = self.bind_elems(|r, c| ctx.matrix.get_element(r, c))?;
        Ok(())
    }

    fn load_ac(&mut self, ctx: &mut AcLoadContext) {
        for (id, v) in self.ac_elems.iter().zip(self.values()) {
            ctx.matrix[*id] += Complex::new(v, 0.0);
        }
    }

    fn param_names(&self) -> &'static [&'static str] {
        &["gain"]
    }

    fn set_param(&mut self, param: &str, value: f64) -> Result<()> {
        match param {
            "gain" => {
                self.gain = value;
                Ok(())
            }
            _ => Err(Error::UnknownParameter {
                device: self.name.clone(),
                param: param.into(),
            }),
        }
    }

    fn get_param(&self, param: &str) -> Option<f64> {
        (param == "gain").then_some(self.gain)
    }
}

/// Voltage-controlled current source: `I(out) = gm · V(ctrl)`, flowing from
/// `out_pos` to `out_neg`.
#[derive(Debug, Clone)]
pub struct Vccs {
    name: String,
    out_pos: String,
    out_neg: String,
    ctrl_pos: String,
    ctrl_neg: String,
    gm: f64,
    elems: [ElemId; 4],
    ac_elems: [ElemId; 4],
    pins: [usize; 4],
}

impl Vccs {
    pub fn new(
        name: impl Into<String>,
        out_pos: impl Into<String>,
        out_neg: impl Into<String>,
        ctrl_pos: impl Into<String>,
        ctrl_neg: impl Into<String>,
        gm: f64,
    ) -> Self {
        Self {
            name: name.into(),
            out_pos: out_pos.into(),
            out_neg: out_neg.into(),
            ctrl_pos: ctrl_pos.into(),
            ctrl_neg: ctrl_neg.into(),
            gm,
            elems: [ElemId::SINK; 4],
            ac_elems: [ElemId::SINK; 4],
            pins: [0; 4],
        }
    }

    fn bind_elems(
        &self,
        mut elem: impl FnMut(usize, usize) -> Result<ElemId>,
    ) -> Result<[ElemId; 4]> {
        let [op, on, cp, cn] = self.pins;
        Ok([elem(op, cp)?, elem(op, cn)?, elem(on, cp)?, elem(on, cn)?])
    }

    fn values(&self) -> [f64; 4] {
        [self.gm, -self.gm, -self.gm, self.gm]
    }
}

impl Device for Vccs {
    fn name(&self) -> &str {
        &self.name
    }

    fn bind(&mut self, ctx: &mut BindContext) -> Result<()> {
        self.pins = [
            ctx.node(&self.out_pos),
            ctx.node(&self.out_neg),
            ctx.node(&self.ctrl_pos),
            ctx.node(&self.ctrl_neg),
        ];
        self.elems = self.bind_elems(|r, c| ctx.matrix.get_element(r, c))?;
        Ok(())
    }

    fn load(&mut self, ctx: &mut LoadContext) -> Result<()> {
        for (id, v) in self.elems.iter().zip(self.values()) {
            ctx.matrix[*id] += v;
        }
        Ok(())
    }

    fn bind_ac(&mut self, ctx: &mut AcBindContext) -> Result<()> {
        self.ac_elems = self.bind_elems(|r, c| ctx.matrix.get_element(r, c))?;
        Ok(())
    }

    fn load_ac(&mut self, ctx: &mut AcLoadContext) {
        for (id, v) in self.ac_elems.iter().zip(self.values()) {
            ctx.matrix[*id] += Complex::new(v, 0.0);
        }
    }

    fn param_names(&self) -> &'static [&'static str] {
        &["gain"]
    }

    fn set_param(&mut self, param: &str, value: f64) -> Result<()> {
        match param {
            "gain" => {
                self.gm = value;
                Ok(())
            }
            _ => Err(Error::UnknownParameter {
                device: self.name.clone(),
                param: param.into(),
            }),
        }
    }

    fn get_param(&self, param: &str) -> Option<f64> {
        (param == "gain").then_some(self.gm)
    }
}

/// Current-controlled current source: `I(out) = gain · I(ctrl)` where the
/// controlling current is the branch current of a named voltage source.
#[derive(Debug, Clone)]
pub struct Cccs {
    name: String,
    out_pos: String,
    out_neg: String,
    ctrl_source: String,
    gain: f64,
    elems: [ElemId; 2],
    ac_elems: [ElemId; 2],
    pins: [usize; 2],
    ctrl_branch: usize,
}

impl Cccs {
    pub fn new(
        name: impl Into<String>,
        out_pos: impl Into<String>,
        out_neg: impl Into<String>,
        ctrl_source: impl Into<String>,
        gain: f64,
    ) -> Self {
        Self {
            name: name.into(),
            out_pos: out_pos.into(),
            out_neg: out_neg.into(),
            ctrl_source: ctrl_source.into(),
            gain,
            elems: [ElemId::SINK; 2],
            ac_elems: [ElemId::SINK; 2],
            pins: [0; 2],
            ctrl_branch: 0,
        }
    }
}

impl Device for Cccs {
    fn name(&self) -> &str {
        &self.name
    }

    fn bind(&mut self, ctx: &mut BindContext) -> Result<()> {
        self.pins = [ctx.node(&self.out_pos), ctx.node(&self.out_neg)];
        self.ctrl_branch = ctx.branch(&self.ctrl_source);
        self.elems = [
            ctx.elem(self.pins[0], self.ctrl_branch)?,
            ctx.elem(self.pins[1], self.ctrl_branch)?,
        ];
        Ok(())
    }

    fn load(&mut self, ctx: &mut LoadContext) -> Result<()> {
        ctx.add(self.elems[0], self.gain);
        ctx.add(self.elems[1], -self.gain);
        Ok(())
    }

    fn bind_ac(&mut self, ctx: &mut AcBindContext) -> Result<()> {
        self.ac_elems = [
            ctx.elem(self.pins[0], self.ctrl_branch)?,
            ctx.elem(self.pins[1], self.ctrl_branch)?,
        ];
        Ok(())
    }

    fn load_ac(&mut self, ctx: &mut AcLoadContext) {
        ctx.add(self.ac_elems[0], Complex::new(self.gain, 0.0));
        ctx.add(self.ac_elems[1], Complex::new(-self.gain, 0.0));
    }

    fn param_names(&self) -> &'static [&'static str] {
        &["gain"]
    }

    fn set_param(&mut self, param: &str, value: f64) -> Result<()> {
        match param {
            "gain" => {
                self.gain = value;
                Ok(())
            }
            _ => Err(Error::UnknownParameter {
                device: self.name.clone(),
                param: param.into(),
            }),
        }
    }

    fn get_param(&self, param: &str) -> Option<f64> {
        (param == "gain").then_some(self.gain)
    }
}

/// Current-controlled voltage source: `V(out) = gain · I(ctrl)`.
#[derive(Debug, Clone)]
pub struct Ccvs {
    name: String,
    out_pos: String,
    out_neg: String,
    ctrl_source: String,
    gain: f64,
    branch: usize,
    ctrl_branch: usize,
    elems: [ElemId; 5],
    ac_elems: [ElemId; 5],
    pins: [usize; 2],
}

impl Ccvs {
    pub fn new(
        name: impl Into<String>,
        out_pos: impl Into<String>,
        out_neg: impl Into<String>,
        ctrl_source: impl Into<String>,
        gain: f64,
    ) -> Self {
        Self {
            name: name.into(),
            out_pos: out_pos.into(),
            out_neg: out_neg.into(),
            ctrl_source: ctrl_source.into(),
            gain,
            branch: 0,
            ctrl_branch: 0,
            elems: [ElemId::SINK; 5],
            ac_elems: [ElemId::SINK; 5],
            pins: [0; 2],
        }
    }

    fn bind_elems(
        &self,
        mut elem: impl FnMut(usize, usize) -> Result<ElemId>,
    ) -> Result<[ElemId; 5]> {
        let [op, on] = self.pins;
        Ok([
            elem(op, self.branch)?,
            elem(on, self.branch)?,
            elem(self.branch, op)?,
            elem(self.branch, on)?,
            elem(self.branch, self.ctrl_branch)?,
        ])
    }

    fn values(&self) -> [f64; 5] {
        [1.0, -1.0, 1.0, -1.0, -self.gain]
    }
}

impl Device for Ccvs {
    fn name(&self) -> &str {
        &self.name
    }

    fn bind(&mut self, ctx: &mut BindContext) -> Result<()> {
        self.pins = [ctx.node(&self.out_pos), ctx.node(&self.out_neg)];
        self.branch = ctx.branch(&self.name);
        self.ctrl_branch = ctx.branch(&self.ctrl_source);
        self.elems = self.bind_elems(|r, c| ctx.matrix.get_element(r, c))?;
        Ok(())
    }

    fn load(&mut self, ctx: &mut LoadContext) -> Result<()> {
        for (id, v) in self.elems.iter().zip(self.values()) {
            ctx.matrix[*id] += v;
        }
        Ok(())
    }

    fn bind_ac(&mut self, ctx: &mut AcBindContext) -> Result<()> {
        self.ac_elems = self.bind_elems(|r, c| ctx.matrix.get_element(r, c))?;
        Ok(())
    }

    fn load_ac(&mut self, ctx: &mut AcLoadContext) {
        for (id, v) in self.ac_elems.iter().zip(self.values()) {
            ctx.matrix[*id] += Complex::new(v, 0.0);
        }
    }

    fn param_names(&self) -> &'static [&'static str] {
        &["gain"]
    }

    fn set_param(&mut self, param: &str, value: f64) -> Result<()> {
        match param {
            "gain" => {
                self.gain = value;
                Ok(())
            }
            _ => Err(Error::UnknownParameter {
                device: self.name.clone(),
                param: param.into(),
            }),
        }
    }

    fn get_param(&self, param: &str) -> Option<f64> {
        (param == "gain").then_some(self.gain)
    }
}
