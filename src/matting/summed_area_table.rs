use std::ops::{Add, Sub};

/// 積分画像（Summed-Area Table）の構造体
///
/// 原点(0,0)から座標(x,y)までの矩形領域内の累積和を保持し、
/// 任意の矩形領域の合計を O(1) で求めるためのデータ構造です。
/// 窓統計エンジンは、重み付きの各フィールドごとに1つずつ構築します。
#[derive(Debug, Clone)]
pub struct SummedAreaTable<T> {
    /// 積分画像のデータ（行優先順序）
    data: Vec<T>,
    /// 画像の幅
    width: u32,
    /// 画像の高さ
    height: u32,
}

impl<T> SummedAreaTable<T>
where
    T: Copy + Default + Add<Output = T> + Sub<Output = T>,
{
    /// 単一チャンネルのデータから積分画像を作成します
    ///
    /// # 引数
    /// * `data` - 元となるフィールド（行優先順序、長さは `width * height`）
    /// * `width` - 画像の幅
    /// * `height` - 画像の高さ
    ///
    /// # パニック
    /// `data` の長さが `width * height` と一致しない場合
    #[must_use]
    pub fn from_data(data: &[T], width: u32, height: u32) -> Self {
        assert_eq!(data.len(), (width as usize) * (height as usize));

        let w = width as usize;
        let mut sat_data = vec![T::default(); data.len()];

        // 行ごとの累積和を保持しながら上の行の値を加算する
        // sat(x, y) = row_sum(0..=x, y) + sat(x, y-1)
        for (y, row) in data.chunks_exact(w.max(1)).enumerate() {
            let mut row_sum = T::default();
            for (x, &value) in row.iter().enumerate() {
                row_sum = row_sum + value;
                let index = y * w + x;
                sat_data[index] = if y > 0 {
                    row_sum + sat_data[index - w]
                } else {
                    row_sum
                };
            }
        }

        Self {
            data: sat_data,
            width,
            height,
        }
    }

    /// 指定された座標での積分画像の値を取得します
    ///
    /// 座標が範囲外（負）の場合は0を返します
    #[must_use]
    pub fn get(&self, x: i64, y: i64) -> T {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            T::default()
        } else {
            self.data[y as usize * self.width as usize + x as usize]
        }
    }

    /// 指定された矩形領域内の値の合計を計算します
    ///
    /// 矩形は両端を含み、画像の範囲にクリップされます。
    /// クリップ後に空になる矩形の合計は0です。
    ///
    /// # 計算式
    /// Sum = sat(x2, y2) - sat(x1-1, y2) - sat(x2, y1-1) + sat(x1-1, y1-1)
    #[must_use]
    pub fn rectangle_sum(&self, x1: i64, y1: i64, x2: i64, y2: i64) -> T {
        let Some((x1, y1, x2, y2)) = self.clip(x1, y1, x2, y2) else {
            return T::default();
        };

        let bottom_right = self.get(x2, y2);
        let top_right = self.get(x2, y1 - 1);
        let bottom_left = self.get(x1 - 1, y2);
        let top_left = self.get(x1 - 1, y1 - 1);

        bottom_right - top_right - bottom_left + top_left
    }

    /// クリップ後の矩形に含まれる実際のピクセル数を返します
    ///
    /// 境界付近では公称の窓面積ではなく、この値で割る必要があります。
    #[must_use]
    pub fn clipped_area(&self, x1: i64, y1: i64, x2: i64, y2: i64) -> usize {
        self.clip(x1, y1, x2, y2)
            .map_or(0, |(x1, y1, x2, y2)| ((x2 - x1 + 1) * (y2 - y1 + 1)) as usize)
    }

    fn clip(&self, x1: i64, y1: i64, x2: i64, y2: i64) -> Option<(i64, i64, i64, i64)> {
        let x1 = x1.max(0);
        let y1 = y1.max(0);
        let x2 = x2.min(i64::from(self.width) - 1);
        let y2 = y2.min(i64::from(self.height) - 1);

        (x1 <= x2 && y1 <= y2).then_some((x1, y1, x2, y2))
    }

    /// 画像の幅を取得します
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// 画像の高さを取得します
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// 積分画像の生データへの参照を取得します
    #[must_use]
    pub fn data(&self) -> &[T] {
        &self.data
    }
}
