//! Utilities.
use anyhow::{anyhow, Result};
use candle_core::{DType, Tensor, Var};
use candle_nn::VarMap;
use log::trace;
use std::collections::HashMap;

fn sorted_vars(varmap: &VarMap) -> Result<Vec<(String, Var)>> {
    let data = varmap
        .data()
        .lock()
        .map_err(|_| anyhow!("VarMap lock is poisoned"))?;
    let mut vars: Vec<_> = data.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    vars.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(vars)
}

/// Apply soft update on variables.
///
/// Variables are identified by their names and visited in sorted-name order.
/// Every variable of `dest` must have a counterpart in `src`.
///
/// dest = tau * src + (1.0 - tau) * dest
///
/// With `tau == 1.0` the source values are copied as-is.
pub fn track(dest: &VarMap, src: &VarMap, tau: f64) -> Result<()> {
    let src: HashMap<String, Var> = sorted_vars(src)?.into_iter().collect();

    for (name, v_dest) in sorted_vars(dest)? {
        trace!("track {}", name);
        let t_src = src
            .get(&name)
            .ok_or_else(|| anyhow!("Variable {} not found in the source", name))?
            .as_tensor();
        let t_dest = if tau == 1.0 {
            t_src.copy()?
        } else {
            ((t_src * tau)? + (v_dest.as_tensor() * (1.0 - tau))?)?
        };
        v_dest.set(&t_dest)?;
    }

    Ok(())
}

/// Returns copies of all variables in `varmap` keyed by name.
pub fn snapshot(varmap: &VarMap) -> Result<Vec<(String, Tensor)>> {
    sorted_vars(varmap)?
        .into_iter()
        .map(|(k, v)| Ok((k, v.as_tensor().copy()?)))
        .collect()
}

/// Splits `xs` of shape `[batch_size, sum(branch_sizes)]` into one tensor per branch.
pub fn break_into_branches(xs: &Tensor, branch_sizes: &[usize]) -> Result<Vec<Tensor>> {
    let mut start = 0;
    branch_sizes
        .iter()
        .map(|n| {
            let branch = xs.narrow(1, start, *n)?;
            start += n;
            Ok(branch)
        })
        .collect()
}

/// One-hot encodes discrete actions of shape `[batch_size, n_branches]`.
///
/// Returns one `[batch_size, branch_sizes[i]]` tensor of type F32 per branch.
pub fn actions_to_onehot(actions: &Tensor, branch_sizes: &[usize]) -> Result<Vec<Tensor>> {
    let actions = actions.to_dtype(DType::U32)?;
    branch_sizes
        .iter()
        .enumerate()
        .map(|(i, n)| {
            let ix = actions.narrow(1, i, 1)?;
            let choices = Tensor::arange(0u32, *n as u32, actions.device())?.unsqueeze(0)?;
            Ok(ix.broadcast_eq(&choices)?.to_dtype(DType::F32)?)
        })
        .collect()
}

/// Elementwise log density of the standard normal distribution.
pub fn normal_logp(x: &Tensor) -> Result<Tensor> {
    Ok(((x.sqr()? * -0.5)? - 0.5 * (2.0 * std::f64::consts::PI).ln())?)
}
