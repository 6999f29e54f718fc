use crate::matting::summed_area_table::SummedAreaTable;
use itertools::{iproduct, izip};

/// 窓の境界を計算する
///
/// `half` は窓の半径（窓サイズ `2 * half + 1`）。画像境界でのクリップは
/// 積分画像側で行う。
#[inline]
fn window_bounds(x: u32, y: u32, half: u32) -> (i64, i64, i64, i64) {
    let (x, y, half) = (i64::from(x), i64::from(y), i64::from(half));
    (x - half, y - half, x + half, y + half)
}

/// 窓サイズから半径を求める（偶数サイズは切り下げ）
#[inline]
pub const fn half_width(window_size: u32) -> u32 {
    window_size.saturating_sub(1) / 2
}

/// 積分画像を使用した重みなしのボックス平均
///
/// 除数はクリップ後の実際のピクセル数であり、公称の窓面積ではない。
/// そのため定数フィールドの平均は境界でも同じ定数になる。
///
/// # 引数
///
/// * `field` - 入力フィールド（行優先順序）
/// * `width` - 画像の幅
/// * `height` - 画像の高さ
/// * `radius` - 窓の半径
#[must_use]
pub fn box_mean(field: &[f64], width: u32, height: u32, radius: u32) -> Vec<f64> {
    let sat = SummedAreaTable::from_data(field, width, height);

    iproduct!(0..height, 0..width)
        .map(|(y, x)| {
            let (x1, y1, x2, y2) = window_bounds(x, y, radius);
            let area = sat.clipped_area(x1, y1, x2, y2);
            sat.rectangle_sum(x1, y1, x2, y2) / area as f64
        })
        .collect()
}

/// 重み付き窓平均を計算するための共有状態
///
/// 重みの積分画像（分母）は一度だけ構築し、各フィールドの平均計算で再利用する。
/// 重みがすべて1の場合、分母はクリップ後のピクセル数と一致する。
#[derive(Debug, Clone)]
pub struct WeightedWindow<'a> {
    weights: &'a [f64],
    width: u32,
    height: u32,
    half: u32,
    weight_sums: Vec<f64>,
}

impl<'a> WeightedWindow<'a> {
    /// 重みフィールドと窓サイズから重み付き窓を作成する
    ///
    /// # パニック
    ///
    /// `weights` の長さが `width * height` と一致しない場合
    #[must_use]
    pub fn new(weights: &'a [f64], width: u32, height: u32, window_size: u32) -> Self {
        let half = half_width(window_size);
        let weight_sums = window_sums(weights, width, height, half);
        Self {
            weights,
            width,
            height,
            half,
            weight_sums,
        }
    }

    /// 各ピクセルにおける窓内の重みの合計
    #[must_use]
    pub fn weight_sums(&self) -> &[f64] {
        &self.weight_sums
    }

    /// 重み付き平均 `Σ(w·f) / Σw` を計算する
    ///
    /// 重みの合計が0の窓では0を返す。
    #[must_use]
    pub fn mean(&self, field: &[f64]) -> Vec<f64> {
        let weighted: Vec<f64> = izip!(field, self.weights).map(|(f, w)| f * w).collect();
        self.normalize(window_sums(&weighted, self.width, self.height, self.half))
    }

    /// 積のフィールドの重み付き平均 `E_w[XY]` を計算する
    #[must_use]
    pub fn mean_of_product(&self, x: &[f64], y: &[f64]) -> Vec<f64> {
        let weighted: Vec<f64> = izip!(x, y, self.weights)
            .map(|(a, b, w)| a * b * w)
            .collect();
        self.normalize(window_sums(&weighted, self.width, self.height, self.half))
    }

    fn normalize(&self, mut sums: Vec<f64>) -> Vec<f64> {
        for (sum, &weight_sum) in sums.iter_mut().zip(&self.weight_sums) {
            *sum = if weight_sum > 0.0 { *sum / weight_sum } else { 0.0 };
        }
        sums
    }
}

/// 各ピクセルの窓内合計（クリップあり）
fn window_sums(field: &[f64], width: u32, height: u32, half: u32) -> Vec<f64> {
    let sat = SummedAreaTable::from_data(field, width, height);

    iproduct!(0..height, 0..width)
        .map(|(y, x)| {
            let (x1, y1, x2, y2) = window_bounds(x, y, half);
            sat.rectangle_sum(x1, y1, x2, y2)
        })
        .collect()
}

/// 窓ごとの平均と共分散
///
/// `covariances` はフィールドの順序対 `(i, j)` ごとに1つの配列を持ち、
/// `i * field_count + j` の位置に格納される。`(i, j)` と `(j, i)` は
/// 同一の値を持つ。
#[derive(Debug, Clone)]
pub struct WindowedMoments {
    field_count: usize,
    means: Vec<Vec<f64>>,
    covariances: Vec<Vec<f64>>,
}

impl WindowedMoments {
    /// フィールド `i` の窓平均
    #[must_use]
    pub fn mean(&self, i: usize) -> &[f64] {
        &self.means[i]
    }

    /// フィールド `i` と `j` の窓共分散
    #[must_use]
    pub fn covariance(&self, i: usize, j: usize) -> &[f64] {
        &self.covariances[i * self.field_count + j]
    }

    /// フィールド数
    #[must_use]
    pub const fn field_count(&self) -> usize {
        self.field_count
    }
}

/// 重み付き窓平均と共分散を計算する
///
/// 共分散は `E_w[XY] - E_w[X]·E_w[Y]` で求める。各期待値は同じ重み付き
/// 窓合計の仕組みで計算されるため、ピクセルあたり O(1) で評価できる。
/// 対称性を厳密に保つため、`i <= j` の組のみ計算して複製する。
///
/// # 引数
///
/// * `fields` - 各フィールド（行優先順序、長さ `width * height`）
/// * `weights` - ピクセルごとの重み（通常は信頼度フィールド）
/// * `width` - 画像の幅
/// * `height` - 画像の高さ
/// * `window_size` - 窓の一辺のピクセル数
#[must_use]
pub fn windowed_mean_and_covariance(
    fields: &[&[f64]],
    weights: &[f64],
    width: u32,
    height: u32,
    window_size: u32,
) -> WindowedMoments {
    let window = WeightedWindow::new(weights, width, height, window_size);
    let field_count = fields.len();

    let means: Vec<Vec<f64>> = fields.iter().map(|field| window.mean(field)).collect();

    let mut covariances = vec![Vec::new(); field_count * field_count];
    for (i, j) in iproduct!(0..field_count, 0..field_count).filter(|(i, j)| i <= j) {
        let product_mean = window.mean_of_product(fields[i], fields[j]);
        let covariance: Vec<f64> = izip!(product_mean, &means[i], &means[j])
            .map(|(xy, mx, my)| mx.mul_add(-my, xy))
            .collect();
        if i != j {
            covariances[j * field_count + i] = covariance.clone();
        }
        covariances[i * field_count + j] = covariance;
    }

    WindowedMoments {
        field_count,
        means,
        covariances,
    }
}
