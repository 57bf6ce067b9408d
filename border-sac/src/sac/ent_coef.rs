//! Entropy coefficients of SAC.
use crate::opt::{Optimizer, OptimizerConfig};
use anyhow::{ensure, Result};
use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{init::Init, VarBuilder, VarMap};

/// Learnable entropy coefficients stored in log space.
///
/// There is one coefficient for continuous actions and one per branch for
/// discrete actions. The coefficients have their own optimizer.
pub struct EntCoef {
    varmap: VarMap,
    log_ent_coef: Tensor,
    opt: Optimizer,
}

impl EntCoef {
    /// Creates `n` coefficients initialized to `init_entcoef`.
    pub fn new(n: usize, init_entcoef: f64, opt_config: &OptimizerConfig, device: &Device) -> Result<Self> {
        ensure!(
            init_entcoef > 0.0,
            "Initial entropy coefficient must be positive, got {}",
            init_entcoef
        );
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let log_ent_coef = vb.get_with_hints(n, "log_ent_coef", Init::Const(init_entcoef.ln()))?;
        let opt = opt_config.build(varmap.all_vars())?;

        Ok(Self {
            varmap,
            log_ent_coef,
            opt,
        })
    }

    /// Log of the coefficients, `[n]`, attached to the graph.
    pub fn log_ent_coef(&self) -> &Tensor {
        &self.log_ent_coef
    }

    /// Returns the entropy coefficients, `[n]`, without gradient.
    pub fn alpha(&self) -> Result<Tensor> {
        Ok(self.log_ent_coef.detach().exp()?)
    }

    /// Mean of the coefficients.
    pub fn mean_alpha(&self) -> Result<f32> {
        Ok(self.alpha()?.mean_all()?.to_scalar::<f32>()?)
    }

    /// Does an optimization step given a loss.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        self.opt.backward_step(loss)
    }

    /// Trainable variables.
    pub fn vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_init_and_positivity() -> Result<()> {
        let device = Device::Cpu;
        let mut ent_coef = EntCoef::new(3, 0.5, &OptimizerConfig::Adam { lr: 0.5 }, &device)?;
        assert_eq!(ent_coef.alpha()?.dims(), &[3]);
        assert!((ent_coef.mean_alpha()? - 0.5).abs() < 1e-6);

        // Push the coefficients down hard
        for _ in 0..50 {
            let loss = (ent_coef.log_ent_coef() * 100.0)?.sum_all()?;
            ent_coef.backward_step(&loss)?;
        }
        let alpha = ent_coef.alpha()?.to_vec1::<f32>()?;
        assert!(alpha.iter().all(|a| *a > 0.0 && *a < 0.5));

        assert!(EntCoef::new(1, 0.0, &OptimizerConfig::default(), &device).is_err());
        Ok(())
    }
}
