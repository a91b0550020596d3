use crate::core::fuzzy;
use crate::core::grid::Grid;
use crate::core::options::{RadarOptions, RequestedFields};
use crate::core::texture;
use crate::io::options_loader::OptionsRepository;
use crate::types::{PpcError, QUALITY_RESIDUAL_CLUTTER_MASK};
use pyo3::exceptions::{PyKeyError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;

fn to_py_err(e: PpcError) -> PyErr {
    match e {
        PpcError::InvalidArgument(_) | PpcError::DimensionMismatch { .. } => {
            PyErr::new::<PyValueError, _>(e.to_string())
        }
        PpcError::UnknownProfile(_) => PyErr::new::<PyKeyError, _>(e.to_string()),
        _ => PyErr::new::<PyRuntimeError, _>(e.to_string()),
    }
}

/// Python module definition
#[pymodule]
fn _ppc(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<PyRadarOptions>()?;
    m.add_class::<PyOptionsRepository>()?;
    m.add_function(wrap_pyfunction!(py_texture, m)?)?;
    m.add_function(wrap_pyfunction!(py_trap, m)?)?;

    m.add("P_TH_CORR", RequestedFields::TH_CORR.bits())?;
    m.add("P_ATT_TH_CORR", RequestedFields::ATT_TH_CORR.bits())?;
    m.add("P_DBZH_CORR", RequestedFields::DBZH_CORR.bits())?;
    m.add("P_ATT_DBZH_CORR", RequestedFields::ATT_DBZH_CORR.bits())?;
    m.add("P_KDP_CORR", RequestedFields::KDP_CORR.bits())?;
    m.add("P_RHOHV_CORR", RequestedFields::RHOHV_CORR.bits())?;
    m.add("P_PHIDP_CORR", RequestedFields::PHIDP_CORR.bits())?;
    m.add("P_ZDR_CORR", RequestedFields::ZDR_CORR.bits())?;
    m.add("P_ZPHI_CORR", RequestedFields::ZPHI_CORR.bits())?;
    m.add("Q_RESIDUAL_CLUTTER_MASK", RequestedFields::QUALITY_RESIDUAL_CLUTTER_MASK.bits())?;
    m.add("Q_ATTENUATION_MASK", RequestedFields::QUALITY_ATTENUATION_MASK.bits())?;
    m.add("Q_ATTENUATION", RequestedFields::QUALITY_ATTENUATION.bits())?;
    m.add("QUALITY_FIELD_NAME", QUALITY_RESIDUAL_CLUTTER_MASK)?;
    Ok(())
}

/// Python wrapper for RadarOptions
#[pyclass(name = "RadarOptions")]
#[derive(Clone)]
struct PyRadarOptions {
    inner: RadarOptions,
}

#[pymethods]
impl PyRadarOptions {
    #[new]
    fn new() -> Self {
        PyRadarOptions {
            inner: RadarOptions::default(),
        }
    }

    #[getter]
    fn name(&self) -> String {
        self.inner.name.clone()
    }

    #[getter]
    fn requested_fields(&self) -> u32 {
        self.inner.requested_fields.bits()
    }

    #[setter]
    fn set_requested_fields(&mut self, value: u32) {
        self.inner.requested_fields = RequestedFields::from_bits(value);
    }

    #[getter]
    fn min_window(&self) -> usize {
        self.inner.min_window
    }

    #[setter]
    fn set_min_window(&mut self, value: i64) -> PyResult<()> {
        self.inner.set_min_window(value).map_err(to_py_err)
    }

    #[getter]
    fn kdp_up(&self) -> f64 {
        self.inner.kdp_up
    }

    #[getter]
    fn kdp_down(&self) -> f64 {
        self.inner.kdp_down
    }

    #[getter]
    fn kdp_std_threshold(&self) -> f64 {
        self.inner.kdp_std_threshold
    }

    #[getter]
    fn melting_layer_bottom_height(&self) -> f64 {
        self.inner.melting_layer_bottom_height
    }

    #[getter]
    fn parameters_uz(&self) -> Vec<f64> {
        self.inner.parameters_uz.to_array().to_vec()
    }

    fn set_band(&mut self, band: char) -> PyResult<()> {
        self.inner.set_band(band).map_err(to_py_err)
    }

    fn __repr__(&self) -> String {
        format!(
            "RadarOptions(name='{}', requested_fields='{}')",
            self.inner.name, self.inner.requested_fields
        )
    }
}

/// Python wrapper for OptionsRepository
#[pyclass(name = "OptionsRepository")]
struct PyOptionsRepository {
    inner: OptionsRepository,
}

#[pymethods]
impl PyOptionsRepository {
    #[staticmethod]
    fn load(path: String) -> PyResult<Self> {
        let inner = OptionsRepository::load(&path).map_err(to_py_err)?;
        Ok(PyOptionsRepository { inner })
    }

    fn exists(&self, name: &str) -> bool {
        self.inner.exists(name)
    }

    fn get_radar_options(&self, name: &str) -> PyResult<PyRadarOptions> {
        let inner = self.inner.get_radar_options(name).map_err(to_py_err)?;
        Ok(PyRadarOptions { inner })
    }

    fn names(&self) -> Vec<String> {
        self.inner.names()
    }
}

/// Texture of a ray-major nested list
#[pyfunction]
#[pyo3(name = "texture")]
fn py_texture(data: Vec<Vec<f64>>, nodata: f64) -> PyResult<Vec<Vec<f64>>> {
    let grid = Grid::from_rows(&data).map_err(to_py_err)?;
    let grid = Grid::with_nodata(grid.into_data(), nodata);
    let result = texture::texture(&grid).map_err(to_py_err)?;
    Ok(result.to_rows())
}

/// Trapezoidal membership of a ray-major nested list
#[pyfunction]
#[pyo3(name = "trap")]
fn py_trap(data: Vec<Vec<f64>>, a: f64, b: f64, s: f64, t: f64) -> PyResult<Vec<Vec<f64>>> {
    let grid = Grid::from_rows(&data).map_err(to_py_err)?;
    Ok(fuzzy::trap(&grid, a, b, s, t).to_rows())
}
