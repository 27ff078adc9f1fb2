/// Utility functions
use candle_nn::VarMap;

/// Calculate the number of scalar parameters held by a var map
///
/// Batch norm running statistics are included.
pub fn count_parameters(varmap: &VarMap) -> usize {
    varmap.all_vars().iter().map(|var| var.elem_count()).sum()
}
