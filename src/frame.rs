//! Таблица данных по столбцам

use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::seq::index;

use crate::error::{FlowError, Result};
use crate::schema::Column;

/// Таблица с именованными столбцами `f64` одинаковой длины.
///
/// Порядок столбцов сохраняется: новые столбцы добавляются в конец,
/// замена существующего столбца не меняет его позицию.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    names: Vec<String>,
    columns: Vec<Array1<f64>>,
    n_rows: usize,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Сборка из пар (имя, значения)
    pub fn from_columns<S, I>(columns: I) -> Result<Self>
    where
        S: Into<String>,
        I: IntoIterator<Item = (S, Vec<f64>)>,
    {
        let mut frame = Frame::new();
        for (name, values) in columns {
            frame.set_named(name, Array1::from(values))?;
        }
        Ok(frame)
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.names.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn has(&self, column: Column) -> bool {
        self.position(column.as_str()).is_some()
    }

    pub fn get(&self, column: Column) -> Result<&Array1<f64>> {
        self.get_named(column.as_str())
    }

    pub fn get_named(&self, name: &str) -> Result<&Array1<f64>> {
        self.position(name)
            .map(|idx| &self.columns[idx])
            .ok_or_else(|| FlowError::MissingColumn(name.to_string()))
    }

    /// Первый отсутствующий столбец из списка
    pub fn require(&self, columns: &[Column]) -> Result<()> {
        match columns.iter().find(|c| !self.has(**c)) {
            Some(missing) => Err(FlowError::MissingColumn(missing.as_str().to_string())),
            None => Ok(()),
        }
    }

    pub fn set(&mut self, column: Column, values: Array1<f64>) -> Result<()> {
        self.set_named(column.as_str(), values)
    }

    /// Заменяет столбец или добавляет его в конец
    pub fn set_named(&mut self, name: impl Into<String>, values: Array1<f64>) -> Result<()> {
        let name = name.into();
        if self.names.is_empty() {
            self.n_rows = values.len();
        } else if values.len() != self.n_rows {
            return Err(FlowError::LengthMismatch {
                column: name,
                expected: self.n_rows,
                actual: values.len(),
            });
        }

        match self.position(&name) {
            Some(idx) => self.columns[idx] = values,
            None => {
                self.names.push(name);
                self.columns.push(values);
            }
        }
        Ok(())
    }

    /// Заполняет столбец одним значением
    pub fn fill(&mut self, column: Column, value: f64) -> Result<()> {
        let n_rows = self.n_rows;
        self.set(column, Array1::from_elem(n_rows, value))
    }

    /// Умножает столбец на коэффициент
    pub fn scale(&mut self, column: Column, ratio: f64) -> Result<()> {
        let idx = self
            .position(column.as_str())
            .ok_or_else(|| FlowError::MissingColumn(column.as_str().to_string()))?;
        self.columns[idx].mapv_inplace(|v| v * ratio);
        Ok(())
    }

    /// Новая таблица только с указанными столбцами в указанном порядке
    pub fn select(&self, columns: &[Column]) -> Result<Frame> {
        let mut selected = Frame::new();
        for column in columns {
            selected.set(*column, self.get(*column)?.clone())?;
        }
        // пустой список столбцов не должен терять число строк
        if columns.is_empty() {
            selected.n_rows = self.n_rows;
        }
        Ok(selected)
    }

    /// Копия без указанных столбцов
    pub fn drop_columns(&self, columns: &[Column]) -> Frame {
        let mut kept = Frame {
            names: Vec::new(),
            columns: Vec::new(),
            n_rows: self.n_rows,
        };
        for (name, values) in self.names.iter().zip(self.columns.iter()) {
            if !columns.iter().any(|c| c.as_str() == name) {
                kept.names.push(name.clone());
                kept.columns.push(values.clone());
            }
        }
        kept
    }

    /// Строки по индексам, в указанном порядке
    pub fn take_rows(&self, indices: &[usize]) -> Frame {
        Frame {
            names: self.names.clone(),
            columns: self
                .columns
                .iter()
                .map(|col| indices.iter().map(|&i| col[i]).collect())
                .collect(),
            n_rows: indices.len(),
        }
    }

    /// Случайная выборка строк без возвращения
    pub fn sample_rows(&self, amount: usize, rng: &mut StdRng) -> Frame {
        let amount = amount.min(self.n_rows);
        let mut indices = index::sample(rng, self.n_rows, amount).into_vec();
        // сохраняем исходный порядок строк внутри выборки
        indices.sort_unstable();
        self.take_rows(&indices)
    }

    /// Построчное объединение таблиц с одинаковым набором столбцов
    pub fn concat(frames: &[Frame]) -> Result<Frame> {
        let Some(first) = frames.first() else {
            return Ok(Frame::new());
        };

        for frame in &frames[1..] {
            if frame.names != first.names {
                return Err(FlowError::SchemaMismatch {
                    expected: first.names.clone(),
                    actual: frame.names.clone(),
                });
            }
        }

        let columns = (0..first.n_cols())
            .map(|j| {
                frames
                    .iter()
                    .flat_map(|f| f.columns[j].iter().copied())
                    .collect::<Array1<f64>>()
            })
            .collect();

        Ok(Frame {
            names: first.names.clone(),
            columns,
            n_rows: frames.iter().map(|f| f.n_rows).sum(),
        })
    }

    /// Матрица признаков: строки таблицы, столбцы в текущем порядке
    pub fn to_matrix(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.n_rows, self.n_cols()), |(i, j)| self.columns[j][i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Array1<f64>)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.columns.iter())
    }

    /// Есть ли пропуски (NaN) в таблице
    pub fn has_nan(&self) -> bool {
        self.columns.iter().any(|c| c.iter().any(|v| v.is_nan()))
    }
}
